use chrono::Utc;
use rand::Rng;
use serde::Serialize;

const RANDOM_DIGITS: usize = 16;

/// Disposable per-request correlation id, shaped like a 24-hex-digit database
/// object id: 8 digits of Unix seconds followed by 16 random digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionTag(String);

impl SessionTag {
    pub fn generate() -> Self {
        Self::at(Utc::now().timestamp())
    }

    fn at(unix_secs: i64) -> Self {
        let mut rng = rand::thread_rng();
        let mut tag = format!("{:08x}", (unix_secs.max(0) as u64) & 0xFFFF_FFFF);
        for _ in 0..RANDOM_DIGITS {
            let digit: u32 = rng.gen_range(0..16);
            tag.push(char::from_digit(digit, 16).unwrap_or('0'));
        }
        Self(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_24_lowercase_hex_digits() {
        let tag = SessionTag::generate();
        assert_eq!(tag.as_str().len(), 24);
        assert!(tag
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn prefix_encodes_seconds() {
        let tag = SessionTag::at(0x6560_0000);
        assert!(tag.as_str().starts_with("65600000"));
    }

    #[test]
    fn consecutive_tags_differ() {
        assert_ne!(SessionTag::generate(), SessionTag::generate());
    }

    #[test]
    fn serializes_as_plain_string() {
        let tag = SessionTag::at(1);
        let value = serde_json::to_value(&tag).unwrap();
        assert_eq!(value, serde_json::Value::String(tag.to_string()));
    }
}
