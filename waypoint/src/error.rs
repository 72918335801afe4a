use {crate::TransportError, std::io, thiserror::Error};

/// Result type used throughout the identity layer.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error returned by the identity layer.
///
/// Except for [`Io`][`Self::Io`], these errors are fatal to the run:
/// processes no longer agree on identities once one of them occurs.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error
{
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Both leaders drew {0} while naming an inter-communicator")]
    TieBreak(i32),

    #[error("Terminal {symbol} has no entry in the remap table of {len}")]
    TerminalOutOfRange{symbol: i32, len: usize},

    #[error("Flattened grammar is malformed at offset {offset}")]
    MalformedGrammar{offset: usize},

    #[error("Flattened grammar of {0} integers is too long to gather")]
    GrammarTooLong(usize),

    #[error("Cannot write trace file: {0}")]
    Io(#[from] io::Error),
}
