use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

const ID_LEN: usize = 8;

/// A session identifier.
///
/// Eight bytes drawn from a cryptographically secure generator, rendered as
/// sixteen lowercase hex characters.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Id([u8; ID_LEN]);

impl Id {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseIdError {
    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error(transparent)]
    InvalidHex(#[from] hex::FromHexError),
}

impl FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LEN * 2 {
            return Err(ParseIdError::InvalidLength {
                expected: ID_LEN * 2,
                actual: s.len(),
            });
        }

        let mut decoded = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut decoded)?;

        Ok(Self(decoded))
    }
}

impl Serialize for Id {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
