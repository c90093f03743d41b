//! Object key conventions shared with the upload pipeline.

const META_SUFFIX: &str = ".meta";

/// Key of the data object: `{data_dir}/{object_id}`.
pub fn object_key(data_dir: &str, object_id: &str) -> String {
    format!("{}/{}", data_dir, object_id)
}

/// Key of the specification document: `{data_dir}/{object_id}.meta`.
pub fn object_meta_key(data_dir: &str, object_id: &str) -> String {
    format!("{}/{}{}", data_dir, object_id, META_SUFFIX)
}

/// Recover the object id from a data object key. Metadata documents and keys
/// outside `data_dir` yield `None`.
pub fn object_id_from_key<'a>(data_dir: &str, key: &'a str) -> Option<&'a str> {
    let id = key.strip_prefix(data_dir)?.strip_prefix('/')?;
    if id.is_empty() || id.contains('/') || id.ends_with(META_SUFFIX) {
        return None;
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_data_dir() {
        assert_eq!(object_key("data", "abc"), "data/abc");
        assert_eq!(object_meta_key("data", "abc"), "data/abc.meta");
    }

    #[test]
    fn only_data_keys_map_back_to_ids() {
        assert_eq!(object_id_from_key("data", "data/abc"), Some("abc"));
        assert_eq!(object_id_from_key("data", "data/abc.meta"), None);
        assert_eq!(object_id_from_key("data", "upload/abc"), None);
        assert_eq!(object_id_from_key("data", "data/nested/abc"), None);
        assert_eq!(object_id_from_key("data", "dataabc"), None);
    }
}
