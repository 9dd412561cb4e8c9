//! Coordinate space labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const NATIVE: &str = "native";

/// Coordinate space of a data item or registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Space {
    /// The scan's own grid.
    Native,
    /// A shared template space such as `MNI152NLin6Asym`.
    Template(String),
}

impl Space {
    pub fn template(name: impl Into<String>) -> Self {
        Self::Template(name.into())
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Native => NATIVE,
            Self::Template(name) => name,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Space {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for Space {
    fn from(s: &str) -> Self {
        if s == NATIVE {
            Self::Native
        } else {
            Self::Template(s.to_string())
        }
    }
}

impl Serialize for Space {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Space {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_native() {
        assert_eq!(Space::from("native"), Space::Native);
        assert_eq!(
            "MNI152NLin6Asym".parse::<Space>().unwrap(),
            Space::template("MNI152NLin6Asym")
        );
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&Space::template("MNI")).unwrap();
        assert_eq!(json, "\"MNI\"");
        let space: Space = serde_json::from_str("\"native\"").unwrap();
        assert!(space.is_native());
    }
}
