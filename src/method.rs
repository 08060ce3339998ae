//! HTTP method as a typed enum.
//!
//! Dispatch tables key on [`Method`]. Parsing is case-insensitive because the
//! verb table is written in lower case (`method = "post"`) while requests
//! arrive in upper case (`POST`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Method {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

impl Method {
    /// Returns the lowercase form used in envelopes and logs (e.g. `"get"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "delete",
            Self::Get     => "get",
            Self::Head    => "head",
            Self::Options => "options",
            Self::Patch   => "patch",
            Self::Post    => "post",
            Self::Put     => "put",
        }
    }
}

/// Parses a method name in any letter case (`"GET"`, `"get"`, `"Get"`).
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete"  => Ok(Self::Delete),
            "get"     => Ok(Self::Get),
            "head"    => Ok(Self::Head),
            "options" => Ok(Self::Options),
            "patch"   => Ok(Self::Patch),
            "post"    => Ok(Self::Post),
            "put"     => Ok(Self::Put),
            _         => Err(()),
        }
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|()| de::Error::custom(format!("unknown HTTP method `{s}`")))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
