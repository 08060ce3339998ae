//! Configuration: listener address, verb table and endpoint groups.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3080"
//!
//! # Optional; defaults to get/create/update/delete.
//! [[verbs]]
//! prefix = "get"
//! method = "get"
//!
//! [[endpoints]]
//! name = "MyService"
//! regex = "/myservice/rest/v1.0/(\\w+)"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::convention::VerbMap;
use crate::error::Error;

/// Root configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub verbs: VerbMap,
    pub endpoints: Vec<EndpointConfig>,
}

/// Listener configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g. `"0.0.0.0:3080"`).
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3080".to_owned() }
    }
}

/// One endpoint group: which service, behind which URL pattern.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct EndpointConfig {
    /// Name the service was registered under.
    pub name: String,
    /// Regular expression whose first capture group is the resource name.
    pub regex: String,
}

impl Config {
    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }
}
