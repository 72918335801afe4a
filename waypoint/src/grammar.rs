//! Flattening and collecting compressed traces.
//!
//! Each process compresses its events into a grammar of rewrite rules.
//! At the end of the run, the grammars are flattened into integer arrays,
//! gathered at world rank 0, and written to the trace file back to back.
//!
//! A flattened grammar is laid out as follows:
//!
//! ```text
//! rule_count
//! rule_head symbol_count symbol ...    (rule_count times)
//! ```
//!
//! Which symbols are terminals and which refer to other rules
//! is decided by the grammar builder; see [`SymbolConvention`].

use {
    crate::{Error, Result, Transport},
    os_ext::{O_CREAT, O_EXCL, O_RDONLY, O_WRONLY},
    std::{
        fs::{File, remove_file},
        io::{self, BufWriter, Read, Write},
        mem::size_of,
        path::{Path, PathBuf},
    },
};

/// Rewrite rule of a grammar.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rule
{
    /// Identifier of the rule.
    pub head: i32,

    /// Terminals and rule references the rule expands to.
    pub body: Vec<i32>,
}

/// Tells terminals apart from rule references.
///
/// Terminals are numbered from zero for remapping.
pub trait SymbolConvention
{
    /// The number of a terminal, or nothing for a rule reference.
    fn terminal_index(&self, symbol: i32) -> Option<usize>;

    /// Whether a symbol is a terminal.
    fn is_terminal(&self, symbol: i32) -> bool
    {
        self.terminal_index(symbol).is_some()
    }
}

/// Non-negative symbols are terminals; negative ones refer to rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonNegativeTerminals;

impl SymbolConvention for NonNegativeTerminals
{
    fn terminal_index(&self, symbol: i32) -> Option<usize>
    {
        usize::try_from(symbol).ok()
    }
}

/// Negative symbols are terminals, with `-1` the first;
/// non-negative ones refer to rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct NegativeTerminals;

impl SymbolConvention for NegativeTerminals
{
    fn terminal_index(&self, symbol: i32) -> Option<usize>
    {
        usize::try_from(!symbol).ok()
    }
}

/// The number of integers a grammar flattens to.
pub fn flattened_len(rules: &[Rule]) -> usize
{
    1 + rules.iter().map(|r| 2 + r.body.len()).sum::<usize>()
}

/// Flatten a grammar.
///
/// Rules are written in the order given.
/// If `remap` is given, every terminal is replaced by its entry in `remap`.
pub fn flatten<C>(rules: &[Rule], remap: Option<&[i32]>, convention: &C)
    -> Result<Vec<i32>>
    where C: SymbolConvention + ?Sized
{
    let remap_symbol = |symbol: i32| -> Result<i32> {
        match (remap, convention.terminal_index(symbol)) {
            (Some(table), Some(index)) =>
                table.get(index).copied()
                    .ok_or(Error::TerminalOutOfRange{symbol, len: table.len()}),
            _ => Ok(symbol),
        }
    };

    let mut flat = Vec::with_capacity(flattened_len(rules));
    flat.push(count(rules.len())?);
    for rule in rules {
        flat.push(rule.head);
        flat.push(count(rule.body.len())?);
        for &symbol in &rule.body {
            flat.push(remap_symbol(symbol)?);
        }
    }
    Ok(flat)
}

fn count(len: usize) -> Result<i32>
{
    i32::try_from(len).map_err(|_| Error::GrammarTooLong(len))
}

/// Read back one flattened grammar from the start of `flat`.
///
/// Returns the rules and the number of integers they took up.
pub fn parse(flat: &[i32]) -> Result<(Vec<Rule>, usize)>
{
    let mut offset = 0;

    let rule_count = length(take(flat, &mut offset, 1)?[0], 0)?;
    let mut rules = Vec::new();
    for _ in 0 .. rule_count {
        let at = offset;
        let header = take(flat, &mut offset, 2)?;
        let (head, symbol_count) = (header[0], header[1]);
        let body = take(flat, &mut offset, length(symbol_count, at + 1)?)?;
        rules.push(Rule{head, body: body.to_vec()});
    }
    Ok((rules, offset))
}

/// Take the next `len` integers and advance `offset` past them.
fn take<'a>(flat: &'a [i32], offset: &mut usize, len: usize) -> Result<&'a [i32]>
{
    let at = *offset;
    let slice = flat.get(at .. at.saturating_add(len))
        .ok_or(Error::MalformedGrammar{offset: at})?;
    *offset += len;
    Ok(slice)
}

/// Interpret a count read at `offset`.
fn length(value: i32, offset: usize) -> Result<usize>
{
    usize::try_from(value).map_err(|_| Error::MalformedGrammar{offset})
}

/// Read back a concatenation of flattened grammars, such as a trace file.
pub fn parse_all(mut flat: &[i32]) -> Result<Vec<Vec<Rule>>>
{
    let mut grammars = Vec::new();
    let mut base = 0;
    while !flat.is_empty() {
        let (rules, used) = parse(flat).map_err(|err| match err {
            Error::MalformedGrammar{offset} =>
                Error::MalformedGrammar{offset: base + offset},
            other => other,
        })?;
        grammars.push(rules);
        flat = &flat[used ..];
        base += used;
    }
    Ok(grammars)
}

/// Gather flattened grammars from all processes at world rank 0.
///
/// Collective over the world communicator.
/// At rank 0, returns the grammars concatenated in rank order;
/// elsewhere, returns nothing.
pub fn gather<T>(transport: &T, local: &[i32]) -> Result<Option<Vec<i32>>>
    where T: Transport
{
    let world = T::COMM_WORLD;
    let counts = transport.gather_int(count(local.len())?, 0, world)?;

    if transport.comm_rank(world)? != 0 {
        transport.gatherv_int(local, &[], &[], 0, 0, world)?;
        return Ok(None);
    }

    let (displs, total) = displacements(&counts).map_err(|err| {
        // The other ranks are already waiting in the gather.
        tracing::error!(processes = counts.len(), %err,
                        "Cannot receive the gathered grammars; \
                         other processes are left waiting");
        err
    })?;

    let gathered = transport.gatherv_int(local, &counts, &displs, total, 0, world)?;
    Ok(Some(gathered))
}

/// Offsets at which each process's grammar lands, and their total length.
fn displacements(counts: &[i32]) -> Result<(Vec<i32>, usize)>
{
    let mut displs = Vec::with_capacity(counts.len());
    let mut total = 0usize;
    for &n in counts {
        displs.push(count(total)?);
        total += n as usize;
    }
    count(total)?;
    Ok((displs, total))
}

/// Write integers to a file in native byte order.
///
/// The integers go to a temporary file next to `path`,
/// which then replaces `path`, so that readers never see a partial trace.
/// The file is created with mode 0666 less the umask, like any other file.
pub fn write_trace(path: &Path, data: &[i32]) -> io::Result<()>
{
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(format!(".{:016x}", rand::random::<u64>()));
    let temporary = PathBuf::from(temporary);
    let fd = os_ext::open(&temporary, O_CREAT | O_EXCL | O_WRONLY, 0o666)?;

    let written = write_ints(File::from(fd), data)
        .and_then(|()| os_ext::rename(&temporary, path));
    if written.is_err() {
        let _ = remove_file(&temporary);
    }
    written
}

/// Read integers written by [`write_trace`].
///
/// Pass the result to [`parse_all`] to recover the grammars.
pub fn read_trace(path: &Path) -> io::Result<Vec<i32>>
{
    let fd = os_ext::open(path, O_RDONLY, 0)?;
    let mut bytes = Vec::new();
    File::from(fd).read_to_end(&mut bytes)?;

    let chunks = bytes.chunks_exact(size_of::<i32>());
    if !chunks.remainder().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Trace file ends in a partial integer",
        ));
    }
    Ok(chunks.map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]])).collect())
}

fn write_ints(file: File, data: &[i32]) -> io::Result<()>
{
    let mut writer = BufWriter::new(file);
    for value in data {
        writer.write_all(&value.to_ne_bytes())?;
    }
    writer.into_inner().map_err(|err| err.into_error())?.sync_all()
}

/// Flatten the local grammar, gather all grammars, and write them to `path`.
///
/// Collective over the world communicator.
/// Only rank 0 writes the file; it also gets the gathered integers back.
pub fn dump<T, C>(
    transport:  &T,
    path:       &Path,
    rules:      &[Rule],
    remap:      Option<&[i32]>,
    convention: &C,
) -> Result<Option<Vec<i32>>>
    where T: Transport, C: SymbolConvention + ?Sized
{
    let local = flatten(rules, remap, convention)?;
    let gathered = gather(transport, &local)?;
    if let Some(data) = &gathered {
        write_trace(path, data)?;
        tracing::debug!(path = %path.display(), integers = data.len(),
                        "Wrote trace");
    }
    Ok(gathered)
}
