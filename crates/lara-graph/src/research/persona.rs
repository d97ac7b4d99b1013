//! Analysis personas

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GraphError;

/// Who the analysis is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    /// Plain-language guidance for a member of the public
    Citizen,
    /// Case law, statutes and procedure for a practitioner
    Lawyer,
}

impl Persona {
    /// All personas, in routing order
    pub const ALL: [Persona; 2] = [Persona::Citizen, Persona::Lawyer];

    /// Role string used on the wire and in state
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Citizen => "citizen",
            Persona::Lawyer => "lawyer",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "citizen" => Ok(Persona::Citizen),
            "lawyer" => Ok(Persona::Lawyer),
            _ => Err(GraphError::UnknownRole(s.to_string())),
        }
    }
}
