use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Child => "child",
        }
    }

    pub fn default_avatar(&self) -> &'static str {
        match self {
            Role::Parent => "👨",
            Role::Child => "👧",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::domain::UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parent" => Ok(Role::Parent),
            "child" => Ok(Role::Child),
            other => Err(crate::domain::UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}
