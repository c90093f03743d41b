//! Entity records supplied by the metadata collaborator.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered file: its object id, file name and the group it belongs to.
///
/// Owned by the metadata store; the gateway only reads these.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Object identifier, shared with the object store.
    pub id: String,

    /// Group (analysis/bundle) id shared by a primary file and its index files.
    pub gnos_id: String,

    pub file_name: String,

    #[serde(default)]
    pub project_code: Option<String>,

    /// Access tier, e.g. `controlled` or `open`.
    #[serde(default = "default_access")]
    pub access: String,
}

fn default_access() -> String {
    "controlled".into()
}
