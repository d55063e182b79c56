use common::{Error, Result};
use url::Url;

/// Builds dataset locations below a storage root. Roots may be local paths or
/// object store URLs; `s3a://` is accepted as an alias of `s3://`.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    root: String,
}

impl PathBuilder {
    pub fn new(root: &str) -> Self {
        Self {
            root: normalize_root(root),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory location for a dataset, always ending with `/` so the engine
    /// treats it as a collection rather than a single file.
    pub fn build_dir_path(&self, dataset: &str) -> String {
        format!(
            "{}/{}/",
            self.root.trim_end_matches('/'),
            dataset.trim_matches('/')
        )
    }
}

pub fn normalize_root(root: &str) -> String {
    let root = root.trim();
    match root.strip_prefix("s3a://") {
        Some(rest) => format!("s3://{}", rest),
        None => root.to_string(),
    }
}

pub fn s3_bucket(location: &str) -> Result<Option<String>> {
    if !location.starts_with("s3://") {
        return Ok(None);
    }

    let url = Url::parse(location)?;
    match url.host_str() {
        Some(bucket) if !bucket.is_empty() => Ok(Some(bucket.to_string())),
        _ => Err(Error::InvalidInput(format!(
            "S3 location '{}' has no bucket",
            location
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3a_scheme_normalized() {
        let paths = PathBuilder::new("s3a://udacity-dend/");
        assert_eq!(paths.root(), "s3://udacity-dend/");
        assert_eq!(
            paths.build_dir_path("song_data"),
            "s3://udacity-dend/song_data/"
        );
        assert_eq!(s3_bucket(paths.root()).unwrap().as_deref(), Some("udacity-dend"));
    }

    #[test]
    fn test_local_root() {
        let paths = PathBuilder::new("/tmp/warehouse");
        assert_eq!(paths.build_dir_path("/tracks/"), "/tmp/warehouse/tracks/");
        assert!(s3_bucket(paths.root()).unwrap().is_none());
    }

    #[test]
    fn test_nested_prefix_kept() {
        let paths = PathBuilder::new("s3://bucket/project-files");
        assert_eq!(
            paths.build_dir_path("playback_events"),
            "s3://bucket/project-files/playback_events/"
        );
    }
}
