//! On-disk format of generic content.
//!
//! Each content file is a JSON document:
//!
//! ```text
//! {
//!   "uuid": "4f0c…",
//!   "segments": ["customer", "project"],
//!   "properties": { "name": "abc", "path": "/x/y" }
//! }
//! ```
//!
//! Properties are a `BTreeMap`, so identical content always serializes to
//! identical bytes and git can deduplicate the blobs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::error::{ContentError, ContentResult};
use crate::content::generic::GenericContent;

#[derive(Serialize, Deserialize)]
struct ContentJson {
    uuid: Uuid,
    #[serde(default)]
    segments: Vec<String>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

/// serialize content to JSON bytes
pub fn encode(content: &GenericContent) -> ContentResult<Vec<u8>> {
    let uuid = content.uuid().ok_or(ContentError::MissingUuid)?;
    let json = ContentJson {
        uuid,
        segments: content.segments().to_vec(),
        properties: content.properties().clone(),
    };

    let mut bytes = serde_json::to_vec_pretty(&json)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// deserialize content read from `origin` (used for error reporting)
///
/// when `expected` is given the serialized uuid must match it
pub fn decode(
    bytes: &[u8],
    base: impl Into<PathBuf>,
    expected: Option<&Uuid>,
    origin: &Path,
) -> ContentResult<GenericContent> {
    let json: ContentJson = serde_json::from_slice(bytes)?;

    if let Some(expected) = expected {
        if *expected != json.uuid {
            return Err(ContentError::Corrupted {
                path: origin.to_path_buf(),
                reason: format!(
                    "uuid mismatch: file name suggests '{}' but content has '{}'",
                    expected, json.uuid
                ),
            });
        }
    }

    let mut content = GenericContent::detached();
    content.set_repository_base(base);
    content.set_uuid(json.uuid);
    content.set_segments(json.segments);
    for (key, value) in json.properties {
        content.set_property(key, value);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_is_stable() {
        let uuid = Uuid::new_v4();
        let mut a = GenericContent::with_uuid("/a", &["k"], &["v"], uuid);
        a.set_property("b_field", 2).set_property("a_field", 1);

        let mut b = GenericContent::with_uuid("/b", &["k"], &["v"], uuid);
        b.set_property("a_field", 1).set_property("b_field", 2);

        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn test_format_fields() {
        let uuid = Uuid::new_v4();
        let content = GenericContent::with_uuid("/repo", &["k"], &["v"], uuid);
        let bytes = encode(&content).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["uuid"], serde_json::json!(uuid.to_string()));
        assert_eq!(parsed["segments"], serde_json::json!(["v"]));
        assert_eq!(parsed["properties"]["k"], serde_json::json!("v"));
    }

    #[test]
    fn test_uuid_mismatch_detection() {
        let content = GenericContent::with_uuid("/repo", &["k"], &["v"], Uuid::new_v4());
        let bytes = encode(&content).unwrap();

        let other = Uuid::new_v4();
        let result = decode(&bytes, "/repo", Some(&other), Path::new("v/x"));
        assert!(matches!(result, Err(ContentError::Corrupted { .. })));
    }

    #[test]
    fn test_missing_uuid_cannot_encode() {
        let content = GenericContent::new("/repo", &["k"], &["v"]);
        assert!(matches!(encode(&content), Err(ContentError::MissingUuid)));
    }
}
