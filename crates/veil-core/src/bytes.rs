//! Serde helpers for byte strings written as hex in TOML documents.

/// `Vec<u8>` as a hex string.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        hex::decode(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// `Option<Vec<u8>>` as an optional hex string.
pub mod opt_hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&hex::encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|r| hex::decode(r.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        #[serde(with = "super::hex_bytes")]
        bytes: Vec<u8>,
        #[serde(default, with = "super::opt_hex_bytes")]
        bad_chars: Option<Vec<u8>>,
    }

    #[test]
    fn decode_hex_fields() {
        let doc: Doc = toml::from_str("bytes = \"fc4883\"\nbad_chars = \"000a0d\"\n").unwrap();
        assert_eq!(doc.bytes, vec![0xfc, 0x48, 0x83]);
        assert_eq!(doc.bad_chars, Some(vec![0x00, 0x0a, 0x0d]));
    }

    #[test]
    fn optional_field_may_be_absent() {
        let doc: Doc = toml::from_str("bytes = \"\"\n").unwrap();
        assert!(doc.bytes.is_empty());
        assert!(doc.bad_chars.is_none());
    }

    #[test]
    fn odd_length_hex_is_rejected() {
        assert!(toml::from_str::<Doc>("bytes = \"abc\"\n").is_err());
    }
}
