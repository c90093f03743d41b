//! Download specifications and the parts they are made of.

use serde::{Deserialize, Deserializer, Serialize};
use std::ops::Range;

/// A contiguous byte range of an object, addressed through its own signed URL.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Position of this part within the specification (1-based).
    pub part_number: u32,

    /// Size in bytes. `None` means the part runs to the end of the object.
    #[serde(
        default,
        deserialize_with = "deserialize_part_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub part_size: Option<u64>,

    /// Absolute byte offset of the first byte of this part.
    pub offset: u64,

    /// Signed URL, assigned per request and never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Checksum recorded by the upload pipeline, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl Part {
    pub fn new(part_number: u32, offset: u64, part_size: Option<u64>) -> Self {
        Self {
            part_number,
            part_size,
            offset,
            url: None,
            md5: None,
        }
    }

    /// The half-open byte range covered by this part, if it is bounded and
    /// its end is representable.
    pub fn byte_range(&self) -> Option<Range<u64>> {
        let size = self.part_size?;
        Some(self.offset..self.offset.checked_add(size)?)
    }
}

/// The structured description of an object's parts.
///
/// The persisted form (the `.meta` document in the state bucket) carries the
/// part list and the object size. `relocated` is derived when the document is
/// resolved and is never written back.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSpecification {
    pub object_key: String,
    pub object_id: String,

    /// Mirrors `object_id`; older clients expect the two to match.
    pub upload_id: String,

    pub parts: Vec<Part>,
    pub object_size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_md5: Option<String>,

    /// Set when the document was found in the unpartitioned base bucket.
    #[serde(default)]
    pub relocated: bool,
}

/// Older documents encode an open-ended part as a negative size.
fn deserialize_part_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|size| u64::try_from(size).ok()))
}
