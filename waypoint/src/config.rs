use {
    serde::{Deserialize, Serialize},
    std::{env, ffi::{OsStr, OsString}, path::PathBuf},
};

/// Environment variable enabling per-buffer identities.
pub const TRACK_ADDRESSES_VAR: &str = "WAYPOINT_TRACK_ADDRESSES";

/// Environment variable overriding [`Config::trace_path`].
pub const TRACE_PATH_VAR: &str = "WAYPOINT_TRACE_PATH";

/// Settings for the identity layer.
///
/// The surrounding tool usually embeds this in its own configuration;
/// missing fields take their default values.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config
{
    /// Whether buffers get individual identities.
    ///
    /// When disabled, the allocator hooks forward to the allocator
    /// without recording anything, and every buffer shares
    /// the [placeholder identity][`crate::PLACEHOLDER_IDENTITY`].
    /// Tracking costs a lock and an index update per allocation.
    pub track_addresses: bool,

    /// Where the collecting process writes the gathered grammars.
    pub trace_path: PathBuf,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self{
            track_addresses: false,
            trace_path: PathBuf::from("waypoint.trace"),
        }
    }
}

impl Config
{
    /// Read the configuration from the environment.
    ///
    /// Variables that are not set leave the defaults in place.
    pub fn from_env() -> Self
    {
        Self::from_vars(|name| env::var_os(name))
    }

    fn from_vars<F>(mut var: F) -> Self
        where F: FnMut(&str) -> Option<OsString>
    {
        let mut config = Self::default();

        if let Some(value) = var(TRACK_ADDRESSES_VAR) {
            config.track_addresses = is_truthy(&value);
        }

        if let Some(value) = var(TRACE_PATH_VAR) {
            if !value.is_empty() {
                config.trace_path = PathBuf::from(value);
            }
        }

        config
    }
}

fn is_truthy(value: &OsStr) -> bool
{
    matches!(value.to_str(), Some("1" | "true" | "yes" | "on"))
}
