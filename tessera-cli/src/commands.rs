use crate::config::Config;
use futures_util::StreamExt;
use futures_util::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{
    ChunkUploader, DataChunk, KeyRange, MergeSummary, Result, StoreBuilder, TesseraError, Version,
    VersionLayout, VersionReader,
};

pub struct UploadOutcome {
    pub version: Version,
    pub summary: MergeSummary,
}

/// Upload every regular file under `dir` as one chunk of a fresh version and
/// publish the merged index.
pub async fn upload_dir(
    config: &Config,
    dir: &Path,
    version: Option<Version>,
    low: i64,
    high: i64,
) -> Result<UploadOutcome> {
    let files = list_files(dir).await?;
    let names: Vec<String> = files.iter().map(|(name, _)| name.clone()).collect();
    let ranges = plan_ranges(&names, low, high)?;

    let builder = StoreBuilder::from_config(&config.store);
    let store = builder.build()?;
    let version = version.unwrap_or_else(Version::generate);

    let mut uploader =
        ChunkUploader::with_config(store, version.clone(), low, high, config.uploader.clone())?;
    if let Some(namespace) = builder.resolved_namespace() {
        uploader = uploader.in_namespace(&namespace);
    }
    let uploader = Arc::new(uploader);

    tracing::info!(
        "Uploading {} chunks from {} as version {}",
        ranges.len(),
        dir.display(),
        version
    );

    // Files are read inside the stream so no more than the admission limit
    // are held in memory at once.
    let concurrency = config.uploader.max_concurrent_uploads;
    let results: Vec<Result<()>> = stream::iter(files.into_iter().zip(ranges))
        .map(|((_, path), range)| {
            let uploader = uploader.clone();
            async move {
                let payload = tokio::fs::read(&path).await?;
                uploader.upload(DataChunk::new(range, payload)).await?;
                Ok::<(), TesseraError>(())
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    if let Some(error) = results.into_iter().find_map(|result| result.err()) {
        tracing::error!("Upload of version {} failed; not publishing", version);
        uploader.shutdown().await;
        return Err(error);
    }

    let summary = uploader.finish().await?;
    Ok(UploadOutcome { version, summary })
}

pub struct VersionStatus {
    pub published: bool,
    pub records: Option<usize>,
}

pub async fn version_status(config: &Config, version: &Version) -> Result<VersionStatus> {
    let (store, layout) = open_version(config, version)?;
    let reader = VersionReader::new(store.as_ref(), &layout);

    if !reader.is_published().await? {
        return Ok(VersionStatus {
            published: false,
            records: None,
        });
    }

    let records = reader.load_index().await?.len();
    Ok(VersionStatus {
        published: true,
        records: Some(records),
    })
}

pub async fn version_index(config: &Config, version: &Version) -> Result<Vec<KeyRange>> {
    let (store, layout) = open_version(config, version)?;
    VersionReader::new(store.as_ref(), &layout).load_index().await
}

fn open_version(
    config: &Config,
    version: &Version,
) -> Result<(tessera_core::DynBlobStore, VersionLayout)> {
    let builder = StoreBuilder::from_config(&config.store);
    let store = builder.build()?;
    let layout = VersionLayout::from_config(
        builder.resolved_namespace().as_deref(),
        version,
        &config.uploader,
    );
    Ok((store, layout))
}

async fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                files.push((name.to_string(), entry.path()));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Split `[low, high]` into consecutive, non-overlapping ranges, one per id.
pub fn plan_ranges(ids: &[String], low: i64, high: i64) -> Result<Vec<KeyRange>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    if low > high {
        return Err(TesseraError::Config(format!(
            "low {} is greater than high {}",
            low, high
        )));
    }

    let span = high as i128 - low as i128 + 1;
    let count = ids.len() as i128;
    if count > span {
        return Err(TesseraError::Config(format!(
            "cannot split [{}, {}] into {} chunks",
            low, high, count
        )));
    }

    let base = span / count;
    let remainder = span % count;
    let mut start = low as i128;
    let mut ranges = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let width = base + if (i as i128) < remainder { 1 } else { 0 };
        let end = start + width - 1;
        ranges.push(KeyRange::new(id.clone(), start as i64, end as i64));
        start = end + 1;
    }

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{LocalConfig, StoreBackend, StoreConfig, UploaderConfig};

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_plan_ranges_even_split() {
        let ranges = plan_ranges(&ids(&["a", "b", "c"]), 0, 8).unwrap();
        assert_eq!(
            ranges,
            vec![
                KeyRange::new("a", 0, 2),
                KeyRange::new("b", 3, 5),
                KeyRange::new("c", 6, 8),
            ]
        );
    }

    #[test]
    fn test_plan_ranges_remainder_and_full_span() {
        let ranges = plan_ranges(&ids(&["a", "b"]), 0, 4).unwrap();
        assert_eq!(ranges, vec![KeyRange::new("a", 0, 2), KeyRange::new("b", 3, 4)]);

        let full = plan_ranges(&ids(&["a", "b"]), i64::MIN, i64::MAX).unwrap();
        assert_eq!(full[0].low, i64::MIN);
        assert_eq!(full[1].high, i64::MAX);
        assert_eq!(full[0].high + 1, full[1].low);
    }

    #[test]
    fn test_plan_ranges_errors() {
        assert!(plan_ranges(&ids(&["a"]), 5, 4).is_err());
        assert!(plan_ranges(&ids(&["a", "b", "c"]), 0, 1).is_err());
        assert!(plan_ranges(&[], 0, 1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_dir_round_trip() {
        let objects = tempfile::tempdir().unwrap();
        let input = tempfile::tempdir().unwrap();
        for (name, body) in [("part-0", "zero"), ("part-1", "one"), ("part-2", "two")] {
            std::fs::write(input.path().join(name), body).unwrap();
        }
        std::fs::create_dir(input.path().join("nested")).unwrap();

        let config = Config {
            store: StoreConfig {
                backend: StoreBackend::Local,
                namespace: Some("datasets".to_string()),
                local: Some(LocalConfig {
                    root: objects.path().to_path_buf(),
                }),
                s3: None,
            },
            uploader: UploaderConfig::default().with_max_concurrent_uploads(2),
        };

        let outcome = upload_dir(&config, input.path(), None, 0, 299).await.unwrap();
        assert_eq!(outcome.summary.records, 3);

        let version_dir = objects.path().join("datasets").join(outcome.version.as_str());
        assert_eq!(
            std::fs::read_to_string(version_dir.join("part-1")).unwrap(),
            "one"
        );
        assert!(version_dir.join("finished").exists());
        assert!(!version_dir.join("index_part-0").exists());

        let status = version_status(&config, &outcome.version).await.unwrap();
        assert!(status.published);
        assert_eq!(status.records, Some(3));

        let mut index = version_index(&config, &outcome.version).await.unwrap();
        index.sort_by_key(|range| range.low);
        assert_eq!(index[0], KeyRange::new("part-0", 0, 99));
        assert_eq!(index[2], KeyRange::new("part-2", 200, 299));
    }

    #[tokio::test]
    async fn test_status_of_unknown_version() {
        let objects = tempfile::tempdir().unwrap();
        let config = Config {
            store: StoreConfig {
                backend: StoreBackend::Local,
                namespace: None,
                local: Some(LocalConfig {
                    root: objects.path().to_path_buf(),
                }),
                s3: None,
            },
            uploader: UploaderConfig::default(),
        };

        let version: Version = "missing".parse().unwrap();
        let status = version_status(&config, &version).await.unwrap();
        assert!(!status.published);
        assert!(version_index(&config, &version).await.is_err());
    }
}
