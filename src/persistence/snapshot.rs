//! On-disk snapshot layout.
//!
//! A snapshot is a directory `<root>/<service>/<name>/` containing one
//! records file per cache (`<cache>.records.json`, a JSON array of entries
//! with their partition and version) and a `meta.json` descriptor. The meta
//! file is written last, so its presence marks the snapshot as complete; a
//! directory without a readable meta is treated as absent and skipped by
//! listing.

use crate::error::{GridError, GridResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub(crate) const META_FILE: &str = "meta.json";
const RECORDS_SUFFIX: &str = ".records.json";

/// One stored entry. The partition is recorded at snapshot time and honored
/// at recovery, so versions stay attached to the partition they lived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize, V: Serialize",
    deserialize = "K: DeserializeOwned, V: DeserializeOwned"
))]
pub struct SnapshotRecord<K, V> {
    pub partition: u32,
    pub key: K,
    pub value: V,
    pub version: u64,
}

/// Snapshot descriptor, written last as the validity marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub name: String,
    pub service: String,
    pub created_at_ms: u64,
    pub caches: Vec<String>,
    pub entry_count: u64,
}

pub(crate) fn snapshot_dir(root: &Path, service: &str, name: &str) -> PathBuf {
    root.join(service).join(name)
}

/// A snapshot exists only if its meta file is present and readable.
pub(crate) fn read_meta(dir: &Path) -> Option<SnapshotMeta> {
    let file = fs::File::open(dir.join(META_FILE)).ok()?;
    serde_json::from_reader(BufReader::new(file)).ok()
}

pub(crate) fn write_records<K, V>(
    dir: &Path,
    cache: &str,
    records: &[SnapshotRecord<K, V>],
) -> GridResult<()>
where
    K: Serialize,
    V: Serialize,
{
    let file = fs::File::create(dir.join(format!("{cache}{RECORDS_SUFFIX}")))?;
    serde_json::to_writer(BufWriter::new(file), records)?;
    Ok(())
}

pub(crate) fn read_records<K, V>(dir: &Path, cache: &str) -> GridResult<Vec<SnapshotRecord<K, V>>>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let path = dir.join(format!("{cache}{RECORDS_SUFFIX}"));
    let file = fs::File::open(&path)?;
    let records = serde_json::from_reader(BufReader::new(file))?;
    Ok(records)
}

/// Writes the meta file. Called only after every records file has been
/// written and flushed.
pub(crate) fn write_meta(dir: &Path, meta: &SnapshotMeta) -> GridResult<()> {
    let file = fs::File::create(dir.join(META_FILE))?;
    serde_json::to_writer_pretty(BufWriter::new(file), meta)?;
    Ok(())
}

/// Complete snapshots under one service's directory, sorted by name.
pub(crate) fn list_valid(root: &Path, service: &str) -> GridResult<Vec<SnapshotMeta>> {
    let service_dir = root.join(service);
    if !service_dir.exists() {
        return Ok(Vec::new());
    }
    let mut metas = Vec::new();
    for entry in fs::read_dir(&service_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match read_meta(&entry.path()) {
            Some(meta) => metas.push(meta),
            None => {
                tracing::warn!(path = %entry.path().display(), "incomplete snapshot directory skipped");
            }
        }
    }
    metas.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(metas)
}

/// Removes a snapshot directory. A directory without a meta file is removable
/// too, so the leftovers of an interrupted snapshot can be cleaned up.
pub(crate) fn remove_dir(root: &Path, service: &str, name: &str) -> GridResult<()> {
    let dir = snapshot_dir(root, service, name);
    if !dir.is_dir() {
        return Err(GridError::SnapshotNotFound(name.to_string()));
    }
    fs::remove_dir_all(&dir)?;
    Ok(())
}
