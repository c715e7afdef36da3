//! Environment definitions for the two deployments being compared
use serde::{Deserialize, Serialize};
use std::fmt;

/// The deployment a URL is crawled against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Baseline deployment
    Control,

    /// Candidate deployment
    Experimental,
}

impl Environment {
    /// Both environments, in the order batches are scheduled
    pub const ALL: [Environment; 2] = [Environment::Control, Environment::Experimental];

    /// Converts the environment to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Experimental => "experimental",
        }
    }

    /// Parses an environment from its database string representation
    ///
    /// Returns None if the string doesn't match any known environment.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "control" => Some(Self::Control),
            "experimental" => Some(Self::Experimental),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
