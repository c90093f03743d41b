//! Object listings supplied by the object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One data object as seen by the store: id, modification time and size.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListing {
    pub id: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}
