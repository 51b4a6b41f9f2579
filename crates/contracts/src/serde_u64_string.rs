//! u64 values travel as decimal strings so JSON clients limited to 53-bit
//! numbers keep resource hashes exact. Plain numbers are still accepted.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireU64 {
        Text(String),
        Number(u64),
    }

    match WireU64::deserialize(deserializer)? {
        WireU64::Text(raw) => raw.trim().parse::<u64>().map_err(D::Error::custom),
        WireU64::Number(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use crate::{EntityId, ResourceHash};

    #[test]
    fn ids_accept_string_and_number() {
        let from_text: ResourceHash =
            serde_json::from_str(r#""18446744073709551615""#).expect("string hash");
        assert_eq!(from_text, ResourceHash(u64::MAX));

        let from_number: EntityId = serde_json::from_str("42").expect("numeric id");
        assert_eq!(from_number, EntityId(42));
    }

    #[test]
    fn rejects_non_numeric_text() {
        assert!(serde_json::from_str::<EntityId>(r#""pawn""#).is_err());
    }
}
