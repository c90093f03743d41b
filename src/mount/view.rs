//! Path adapter over a [`MountStorageContext`].
//!
//! Layouts:
//!   - `bundle`:    `/{gnosId}/{fileName}`
//!   - `object-id`: `/{objectId}`

use crate::{
    models::storage_file::{IndexFileKind, StorageFile},
    mount::{MountError, context::MountStorageContext},
};
use clap::ValueEnum;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FileLayout {
    #[default]
    Bundle,
    ObjectId,
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error(transparent)]
    Mount(#[from] MountError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Directory { path: String },
    File { path: String, file: StorageFile },
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::Directory { path } | Node::File { path, .. } => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl DirEntry {
    fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_dir: true,
            size: 0,
            object_id: None,
        }
    }

    fn file(name: &str, file: &StorageFile) -> Self {
        Self {
            name: name.to_string(),
            is_dir: false,
            size: file.size,
            object_id: Some(file.object_id.clone()),
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

fn join(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

#[derive(Clone)]
pub struct MountView {
    context: Arc<MountStorageContext>,
    layout: FileLayout,
}

impl MountView {
    pub fn new(context: Arc<MountStorageContext>, layout: FileLayout) -> Self {
        Self { context, layout }
    }

    pub fn context(&self) -> &MountStorageContext {
        &self.context
    }

    pub fn lookup(&self, path: &str) -> Result<Node, ViewError> {
        self.context.increment_count("lookup", 1);
        self.resolve(path)
    }

    fn resolve(&self, path: &str) -> Result<Node, ViewError> {
        let parts = segments(path);
        let not_found = || ViewError::NotFound(join(&parts));

        let file = match (self.layout, parts.as_slice()) {
            (_, []) => return Ok(Node::Directory { path: "/".into() }),
            (FileLayout::Bundle, [gnos_id]) => {
                if self.context.files_by_group(gnos_id).is_empty() {
                    return Err(not_found());
                }
                return Ok(Node::Directory { path: join(&parts) });
            }
            (FileLayout::Bundle, [gnos_id, file_name]) => self
                .context
                .files_by_group(gnos_id)
                .into_iter()
                .find(|file| file.file_name == *file_name),
            (FileLayout::ObjectId, [object_id]) => self.context.get_file(object_id),
            _ => None,
        };

        file.map(|file| Node::File {
            path: join(&parts),
            file: file.clone(),
        })
        .ok_or_else(not_found)
    }

    /// Entries of a directory, sorted by name.
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>, ViewError> {
        self.context.increment_count("list", 1);

        let path = match self.resolve(path)? {
            Node::Directory { path } => path,
            Node::File { path, .. } => return Err(ViewError::NotADirectory(path)),
        };

        let parts = segments(&path);
        let mut entries = match (self.layout, parts.as_slice()) {
            (FileLayout::Bundle, []) => self
                .context
                .group_ids()
                .into_iter()
                .map(DirEntry::directory)
                .collect::<Vec<_>>(),
            (FileLayout::Bundle, [gnos_id]) => self
                .context
                .files_by_group(gnos_id)
                .into_iter()
                .map(|file| DirEntry::file(&file.file_name, file))
                .collect(),
            (FileLayout::ObjectId, []) => self
                .context
                .files()
                .iter()
                .map(|file| DirEntry::file(&file.object_id, file))
                .collect(),
            _ => Vec::new(),
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|a, b| a.name == b.name);

        debug!(path = %path, entries = entries.len(), "listed directory");
        Ok(entries)
    }

    /// The containing directory; the root is its own parent.
    pub fn parent(&self, path: &str) -> String {
        let parts = segments(path);
        match parts.split_last() {
            Some((_, rest)) => join(rest),
            None => "/".into(),
        }
    }

    /// Companion index files of the file at `path`, in kind order.
    pub fn index_files(&self, path: &str) -> Result<Vec<(IndexFileKind, StorageFile)>, ViewError> {
        match self.resolve(path)? {
            Node::Directory { path } => Err(ViewError::IsADirectory(path)),
            Node::File { file, .. } => Ok(IndexFileKind::ALL
                .into_iter()
                .filter_map(|kind| {
                    self.context
                        .get_index_file(&file.object_id, kind)
                        .map(|index| (kind, index.clone()))
                })
                .collect()),
        }
    }

    /// Signed URL of the file at `path`.
    pub async fn url(&self, path: &str) -> Result<String, ViewError> {
        match self.resolve(path)? {
            Node::Directory { path } => Err(ViewError::IsADirectory(path)),
            Node::File { file, .. } => {
                self.context.increment_count("open", 1);
                Ok(self.context.get_url(&file.object_id).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{
        context::tests::{CountingSource, FixedProbe, sample_entities, sample_listings},
        url_cache::UrlCache,
    };
    use std::time::Duration;

    fn view(layout: FileLayout) -> MountView {
        let context = MountStorageContext::new(
            Arc::new(CountingSource::default()),
            Arc::new(FixedProbe::answering(None)),
            UrlCache::new(Duration::from_secs(3600)),
            sample_entities(),
            sample_listings(),
        );
        MountView::new(Arc::new(context), layout)
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn bundle_layout_nests_files_under_groups() {
        let view = view(FileLayout::Bundle);

        assert_eq!(names(&view.list("/").unwrap()), vec!["g1", "g2"]);
        let g1 = view.list("/g1/").unwrap();
        assert_eq!(names(&g1), vec!["sample.bam", "sample.bam.bai"]);
        assert_eq!(g1[0].size, 1000);
        assert_eq!(g1[0].object_id.as_deref(), Some("obj-a"));

        let node = view.lookup("/g2/calls.vcf.gz.tbi").unwrap();
        assert!(matches!(node, Node::File { ref file, .. } if file.object_id == "obj-d"));
        assert!(view.lookup("/g1").unwrap().is_dir());
    }

    #[test]
    fn object_id_layout_is_flat() {
        let view = view(FileLayout::ObjectId);

        assert_eq!(
            names(&view.list("/").unwrap()),
            vec!["obj-a", "obj-b", "obj-c", "obj-d"]
        );
        assert_eq!(view.lookup("/obj-c").unwrap().path(), "/obj-c");
        assert!(matches!(view.lookup("/g1"), Err(ViewError::NotFound(_))));
    }

    #[test]
    fn missing_and_mistyped_paths() {
        let view = view(FileLayout::Bundle);

        assert!(matches!(view.lookup("/g9"), Err(ViewError::NotFound(_))));
        assert!(matches!(view.lookup("/g1/nope.bam"), Err(ViewError::NotFound(_))));
        assert!(matches!(view.lookup("/g1/sample.bam/x"), Err(ViewError::NotFound(_))));
        assert!(matches!(
            view.list("/g1/sample.bam"),
            Err(ViewError::NotADirectory(_))
        ));
    }

    #[test]
    fn parents_follow_the_path() {
        let view = view(FileLayout::Bundle);
        assert_eq!(view.parent("/g1/sample.bam"), "/g1");
        assert_eq!(view.parent("/g1"), "/");
        assert_eq!(view.parent("/"), "/");
    }

    #[test]
    fn index_files_come_from_the_same_group() {
        let view = view(FileLayout::Bundle);

        let bam = view.index_files("/g1/sample.bam").unwrap();
        assert_eq!(bam.len(), 1);
        assert_eq!(bam[0].0, IndexFileKind::Bai);
        assert_eq!(bam[0].1.file_name, "sample.bam.bai");

        assert!(view.index_files("/g1/sample.bam.bai").unwrap().is_empty());
        assert!(matches!(view.index_files("/g1"), Err(ViewError::IsADirectory(_))));
    }

    #[tokio::test]
    async fn urls_resolve_files_and_count_opens() {
        let view = view(FileLayout::Bundle);

        let url = view.url("/g1/sample.bam").await.unwrap();
        assert_eq!(url, "url-obj-a-0");
        assert!(matches!(view.url("/g1").await, Err(ViewError::IsADirectory(_))));

        view.list("/").unwrap();
        let metrics = view.context().metrics();
        assert_eq!(metrics["open"], 1);
        assert_eq!(metrics["list"], 1);
    }
}
