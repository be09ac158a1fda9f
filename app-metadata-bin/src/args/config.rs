//! Stamp defaults shared by every image of a product, kept in a TOML file.
//!
//! ```toml
//! name = "wsm-app"
//! dest_address = "0x10000"
//! state = "download"
//! ```

use std::path::Path;

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub name: Option<String>,
    /// Kept as text so that hex can be written the same way as on the CLI.
    pub dest_address: Option<String>,
    pub state: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(Error::Read)?;
        toml::from_str(&text).map_err(Error::Parse)
    }
}

#[derive(Debug)]
pub enum Error {
    Read(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Read(e) => write!(f, "failed to read config file: {e}"),
            Error::Parse(e) => write!(f, "config file format error in TOML: {e}"),
        }
    }
}

impl std::error::Error for Error {}
