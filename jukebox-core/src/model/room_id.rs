use std::{fmt::Display, str::FromStr};

use lazy_static::lazy_static;
use rand::{thread_rng, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    static ref ROOM_ID_REGEX: Regex = Regex::new(r"^[0-9A-Z]{6}$").expect("regex compiles");
}

const ROOM_ID_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A 6 character room code. Always stored upper-cased, so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0:?} is not a valid room id")]
pub struct InvalidRoomId(pub String);

impl RoomId {
    pub const LENGTH: usize = 6;

    /// Normalizes and validates a room id.
    pub fn parse(raw: &str) -> Result<Self, InvalidRoomId> {
        let normalized = raw.trim().to_uppercase();

        if ROOM_ID_REGEX.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(InvalidRoomId(raw.to_string()))
        }
    }

    /// Generates a new random room id.
    pub fn generate() -> Self {
        let mut rng = thread_rng();

        let code: String = std::iter::repeat(())
            .map(|_| ROOM_ID_CHARSET[rng.gen_range(0..ROOM_ID_CHARSET.len())] as char)
            .take(Self::LENGTH)
            .collect();

        Self(code.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = InvalidRoomId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = InvalidRoomId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(value: RoomId) -> Self {
        value.0
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::RoomId;

    #[test]
    fn normalizes_to_uppercase() {
        let id = RoomId::parse(" ab12cd ").expect("parses");

        assert_eq!(id.as_str(), "AB12CD");
        assert_eq!(id, RoomId::parse("AB12CD").unwrap());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(RoomId::parse("AB12C").is_err());
        assert!(RoomId::parse("AB12CDE").is_err());
        assert!(RoomId::parse("AB-2CD").is_err());
        assert!(RoomId::parse("").is_err());
    }

    #[test]
    fn generated_ids_are_valid() {
        for _ in 0..100 {
            let id = RoomId::generate();
            assert_eq!(RoomId::parse(id.as_str()).unwrap(), id);
        }
    }

    #[test]
    fn deserializing_normalizes() {
        let id: RoomId = serde_json::from_str("\"xy98zz\"").unwrap();
        assert_eq!(id.as_str(), "XY98ZZ");

        assert!(serde_json::from_str::<RoomId>("\"nope\"").is_err());
    }
}
