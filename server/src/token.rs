use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Width of an entity identifier in bytes.
pub const TOKEN_SIZE: usize = 32;

/// Opaque fixed-width identity naming an actor or a stage.
///
/// Rendered on the wire as lower-case hex. Ordering is byte-wise and is used
/// as the deterministic tie-break when ranking entities with equal counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token([u8; TOKEN_SIZE]);

impl Token {
    pub const fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    /// Fresh random token.
    pub fn random() -> Self {
        let bytes: [u8; TOKEN_SIZE] = rand::rng().random();
        Self(bytes)
    }

    /// Parse a hex token. Returns None for non-hex input or the wrong length.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; TOKEN_SIZE];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Display name paired with the hex identity it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameToken {
    pub name: String,
    pub token: String,
}

impl NameToken {
    pub fn new(name: impl Into<String>, token: &Token) -> Self {
        Self {
            name: name.into(),
            token: token.to_hex(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parse_matches_display() {
        let token = Token::from_bytes([0xab; TOKEN_SIZE]);
        let hex = token.to_string();
        assert_eq!(hex.len(), TOKEN_SIZE * 2);
        assert_eq!(Token::from_hex(&hex), Some(token));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(Token::from_hex("abcd"), None);
        assert_eq!(Token::from_hex(""), None);
    }

    #[test]
    fn test_rejects_non_hex() {
        let bad = "zz".repeat(TOKEN_SIZE);
        assert_eq!(Token::from_hex(&bad), None);
    }

    #[test]
    fn test_random_tokens_differ() {
        assert_ne!(Token::random(), Token::random());
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let token = Token::from_bytes([1; TOKEN_SIZE]);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(TOKEN_SIZE)));
    }
}
