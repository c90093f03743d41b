//! The joined view of an entity and its object listing.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A file in the mount view. Exists only when both the metadata record and
/// the stored object are present.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageFile {
    pub object_id: String,
    pub file_name: String,
    pub gnos_id: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Kinds of companion index files that sit next to a data file in its group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFileKind {
    Bai,
    Crai,
    Tbi,
    Idx,
}

impl IndexFileKind {
    pub const ALL: [IndexFileKind; 4] = [
        IndexFileKind::Bai,
        IndexFileKind::Crai,
        IndexFileKind::Tbi,
        IndexFileKind::Idx,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            IndexFileKind::Bai => "bai",
            IndexFileKind::Crai => "crai",
            IndexFileKind::Tbi => "tbi",
            IndexFileKind::Idx => "idx",
        }
    }

    /// The file name an index of this kind would carry for `file_name`.
    pub fn index_name_for(&self, file_name: &str) -> String {
        format!("{}.{}", file_name, self.extension())
    }
}
