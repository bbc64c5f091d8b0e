use serde::{Deserialize, Serialize};

/// Request to transcode one already-encrypted source segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeEvent {
    #[serde(default)]
    pub bucket: String,
    /// Object key of the source segment, e.g. `rec/asset/out0007.ts`.
    pub key: String,
    /// AES-128 key bytes, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub drm_key: Vec<u8>,
    /// IV exactly as it should appear in the key info file.
    pub drm_initialization_vector: String,
    pub qualities: Vec<String>,
    #[serde(default)]
    pub extract_images: bool,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_json() {
        let json = r#"{
            "bucket": "recordings",
            "key": "rec/asset/out0007.ts",
            "drmKey": "AAECAwQFBgcICQoLDA0ODw==",
            "drmInitializationVector": "0x000102030405060708090a0b0c0d0e0f",
            "qualities": ["720p", "480p"],
            "extractImages": true
        }"#;

        let event: TranscodeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.key, "rec/asset/out0007.ts");
        assert_eq!(event.drm_key, (0u8..16).collect::<Vec<_>>());
        assert_eq!(event.qualities, vec!["720p", "480p"]);
        assert!(event.extract_images);

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["drmKey"], "AAECAwQFBgcICQoLDA0ODw==");
    }

    #[test]
    fn test_event_rejects_invalid_key_encoding() {
        let json = r#"{"key": "k", "drmKey": "***", "drmInitializationVector": "0x0", "qualities": []}"#;
        assert!(serde_json::from_str::<TranscodeEvent>(json).is_err());
    }
}
