use crate::chunk::Version;
use crate::config::UploaderConfig;

/// Object naming under one version directory:
///
/// ```text
/// {namespace}/{version}/{chunk_id}            chunk payload
/// {namespace}/{version}/{prefix}_{chunk_id}   partial index record
/// {namespace}/{version}/{prefix}              merged index
/// {namespace}/{version}/{marker}              completion marker
/// ```
#[derive(Debug, Clone)]
pub struct VersionLayout {
    dir: String,
    index_prefix: String,
    finished_marker: String,
}

impl VersionLayout {
    pub fn new(
        namespace: Option<&str>,
        version: &Version,
        index_prefix: impl Into<String>,
        finished_marker: impl Into<String>,
    ) -> Self {
        let dir = match namespace.map(|ns| ns.trim_matches('/')) {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, version),
            _ => version.to_string(),
        };

        Self {
            dir,
            index_prefix: index_prefix.into(),
            finished_marker: finished_marker.into(),
        }
    }

    pub fn from_config(
        namespace: Option<&str>,
        version: &Version,
        config: &UploaderConfig,
    ) -> Self {
        Self::new(
            namespace,
            version,
            config.index_prefix.clone(),
            config.finished_marker.clone(),
        )
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn payload_path(&self, chunk_id: &str) -> String {
        format!("{}/{}", self.dir, chunk_id)
    }

    pub fn partial_index_path(&self, chunk_id: &str) -> String {
        format!("{}/{}_{}", self.dir, self.index_prefix, chunk_id)
    }

    pub fn merged_index_path(&self) -> String {
        format!("{}/{}", self.dir, self.index_prefix)
    }

    pub fn marker_path(&self) -> String {
        format!("{}/{}", self.dir, self.finished_marker)
    }

    /// Chunk id encoded in a partial index object name, if `name` is one.
    pub fn partial_index_chunk_id<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_prefix(self.index_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|id| !id.is_empty())
    }

    pub fn validate_chunk_id(&self, chunk_id: &str) -> std::result::Result<(), String> {
        if chunk_id.is_empty() {
            return Err("chunk id cannot be empty".to_string());
        }
        if chunk_id.contains('/') {
            return Err("chunk id must not contain '/'".to_string());
        }
        if chunk_id == self.index_prefix || chunk_id == self.finished_marker {
            return Err("chunk id collides with a reserved object name".to_string());
        }
        if self.partial_index_chunk_id(chunk_id).is_some() {
            return Err(format!(
                "chunk id must not start with '{}_'",
                self.index_prefix
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(namespace: Option<&str>) -> VersionLayout {
        let version: Version = "v1".parse().unwrap();
        VersionLayout::new(namespace, &version, "index", "finished")
    }

    #[test]
    fn test_paths() {
        let scoped = layout(Some("datasets/"));
        assert_eq!(scoped.dir(), "datasets/v1");
        assert_eq!(scoped.payload_path("A"), "datasets/v1/A");
        assert_eq!(scoped.partial_index_path("A"), "datasets/v1/index_A");
        assert_eq!(scoped.merged_index_path(), "datasets/v1/index");
        assert_eq!(scoped.marker_path(), "datasets/v1/finished");

        assert_eq!(layout(None).dir(), "v1");
        assert_eq!(layout(Some("")).dir(), "v1");
    }

    #[test]
    fn test_partial_index_names() {
        let layout = layout(None);
        assert_eq!(layout.partial_index_chunk_id("index_A"), Some("A"));
        assert_eq!(layout.partial_index_chunk_id("index_a_b"), Some("a_b"));
        assert_eq!(layout.partial_index_chunk_id("index"), None);
        assert_eq!(layout.partial_index_chunk_id("index_"), None);
        assert_eq!(layout.partial_index_chunk_id("indexA"), None);
        assert_eq!(layout.partial_index_chunk_id("A"), None);
        assert_eq!(layout.partial_index_chunk_id("finished"), None);
    }

    #[test]
    fn test_validate_chunk_id() {
        let layout = layout(None);
        assert!(layout.validate_chunk_id("chunk-1").is_ok());
        assert!(layout.validate_chunk_id("reindex_1").is_ok());
        assert!(layout.validate_chunk_id("").is_err());
        assert!(layout.validate_chunk_id("a/b").is_err());
        assert!(layout.validate_chunk_id("index").is_err());
        assert!(layout.validate_chunk_id("finished").is_err());
        assert!(layout.validate_chunk_id("index_7").is_err());
    }
}
