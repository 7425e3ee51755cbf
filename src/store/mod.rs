//! Flat-file object store.
//!
//! One pretty-printed JSON snapshot per collection under the data directory.
//! Every save replaces the whole collection: the new snapshot is written to a
//! hidden temp file, fsynced, then renamed over the old one. A batch touching
//! several collections is made atomic with a `commit.json` manifest that is
//! rolled forward by [`Store::recover`] if the process dies mid-rename.

use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::now_utc_rfc3339;
use crate::domain::candidature::Candidature;
use crate::domain::party::{Provider, Resident};
use crate::domain::problem::Problem;
use crate::domain::project::Project;
use crate::notify::NotificationIntent;

pub const SNAPSHOT_SCHEMA_VERSION: i64 = 1;
pub const MANIFEST_FILE: &str = "commit.json";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Problems,
    Candidatures,
    Projects,
    Providers,
    Residents,
    Outbox,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Problems,
        Collection::Candidatures,
        Collection::Projects,
        Collection::Providers,
        Collection::Residents,
        Collection::Outbox,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Problems => "problems",
            Collection::Candidatures => "candidatures",
            Collection::Projects => "projects",
            Collection::Providers => "providers",
            Collection::Residents => "residents",
            Collection::Outbox => "outbox",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed record persisted as part of one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Identifier or business key, used for duplicate detection.
    fn key(&self) -> String;
}

impl Record for Problem {
    const COLLECTION: Collection = Collection::Problems;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Candidature {
    const COLLECTION: Collection = Collection::Candidatures;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Provider {
    const COLLECTION: Collection = Collection::Providers;

    fn key(&self) -> String {
        self.neq.clone()
    }
}

impl Record for Resident {
    const COLLECTION: Collection = Collection::Residents;

    fn key(&self) -> String {
        self.email.clone()
    }
}

impl Record for NotificationIntent {
    const COLLECTION: Collection = Collection::Outbox;

    fn key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    schema_version: i64,
    collection: Collection,
    written_at: String,
    checksum: String,
    record_count: usize,
    records: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CommitManifest {
    txn: String,
    written_at: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ManifestEntry {
    collection: Collection,
    temp: String,
    target: String,
}

/// State of one snapshot file on disk, as seen by a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotHealth {
    Missing,
    Readable { records: usize },
    Unreadable { reason: String },
}

/// Whole-collection replacements to commit together.
#[derive(Debug, Default)]
pub struct Batch {
    entries: Vec<(Collection, Vec<u8>)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<R: Record>(&mut self, records: &[R]) -> Result<&mut Self, StoreError> {
        let bytes = encode_snapshot(R::COLLECTION, records)?;
        self.entries
            .retain(|(collection, _)| *collection != R::COLLECTION);
        self.entries.push((R::COLLECTION, bytes));
        Ok(self)
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.entries
            .iter()
            .map(|(collection, _)| *collection)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    Staged(usize),
    ManifestWritten,
    BeforeRename,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoverySummary {
    pub rolled_forward: usize,
    pub removed_temps: usize,
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::io(&root, source))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.file_name())
    }

    /// Loads a whole collection. A missing or unreadable snapshot yields an
    /// empty collection so a fresh data directory bootstraps cleanly.
    pub fn load_all<R: Record>(&self) -> Vec<R> {
        let path = self.path_for(R::COLLECTION);
        let records = match read_snapshot(&path, R::COLLECTION) {
            Ok(Some(records)) => records,
            Ok(None) => return Vec::new(),
            Err(reason) => {
                warn!(
                    collection = %R::COLLECTION,
                    path = %path.display(),
                    reason = %reason,
                    "unreadable snapshot, treating collection as empty"
                );
                return Vec::new();
            }
        };

        match serde_json::from_value::<Vec<R>>(records) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    collection = %R::COLLECTION,
                    path = %path.display(),
                    error = %err,
                    "snapshot records do not match the record schema, treating collection as empty"
                );
                Vec::new()
            }
        }
    }

    pub fn inspect(&self, collection: Collection) -> SnapshotHealth {
        match read_snapshot(&self.path_for(collection), collection) {
            Ok(None) => SnapshotHealth::Missing,
            Ok(Some(Value::Array(items))) => SnapshotHealth::Readable {
                records: items.len(),
            },
            Ok(Some(_)) => SnapshotHealth::Unreadable {
                reason: "records is not an array".to_string(),
            },
            Err(reason) => SnapshotHealth::Unreadable { reason },
        }
    }

    pub fn save_all<R: Record>(&self, records: &[R]) -> Result<(), StoreError> {
        let mut batch = Batch::new();
        batch.put(records)?;
        self.commit(batch)
    }

    pub fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        self.commit_with(batch, &mut |_| Ok(()))
    }

    fn commit_with(
        &self,
        batch: Batch,
        hook: &mut dyn FnMut(CommitStage) -> std::io::Result<()>,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let txn = Uuid::now_v7().simple().to_string();
        let mut staged: Vec<(Collection, PathBuf, PathBuf)> = Vec::new();

        for (index, (collection, bytes)) in batch.entries.iter().enumerate() {
            let target = self.path_for(*collection);
            self.preserve_unreadable(*collection, &target, &txn)?;
            let temp = self
                .root
                .join(format!(".{}.{}{}", collection.file_name(), txn, TEMP_SUFFIX));
            let written = write_synced(&temp, bytes).and_then(|()| hook(CommitStage::Staged(index)));
            staged.push((*collection, temp.clone(), target));
            if let Err(source) = written {
                discard_temps(&staged);
                return Err(StoreError::io(&temp, source));
            }
        }

        let manifest_path = self.root.join(MANIFEST_FILE);
        if staged.len() > 1 {
            let manifest = CommitManifest {
                txn: txn.clone(),
                written_at: now_utc_rfc3339(),
                entries: staged
                    .iter()
                    .map(|(collection, temp, target)| ManifestEntry {
                        collection: *collection,
                        temp: file_name_of(temp),
                        target: file_name_of(target),
                    })
                    .collect(),
            };
            let manifest_temp = self
                .root
                .join(format!(".{}.{}{}", MANIFEST_FILE, txn, TEMP_SUFFIX));
            let bytes = serde_json::to_vec_pretty(&manifest)?;
            let written = write_synced(&manifest_temp, &bytes)
                .and_then(|()| hook(CommitStage::ManifestWritten))
                .and_then(|()| fs::rename(&manifest_temp, &manifest_path))
                .and_then(|()| sync_dir(&self.root));
            if let Err(source) = written {
                discard_temps(&staged);
                let _ = fs::remove_file(&manifest_temp);
                return Err(StoreError::io(&manifest_path, source));
            }
        }

        // With a manifest on disk the commit is decided; a failure past this
        // point is finished by the next recover().
        if let Err(source) = hook(CommitStage::BeforeRename) {
            if staged.len() == 1 {
                discard_temps(&staged);
            }
            return Err(StoreError::io(&self.root, source));
        }

        for (_, temp, target) in &staged {
            fs::rename(temp, target).map_err(|source| StoreError::io(target, source))?;
        }
        sync_dir(&self.root).map_err(|source| StoreError::io(&self.root, source))?;
        if staged.len() > 1 {
            fs::remove_file(&manifest_path)
                .map_err(|source| StoreError::io(&manifest_path, source))?;
            sync_dir(&self.root).map_err(|source| StoreError::io(&self.root, source))?;
        }

        debug!(
            txn = %txn,
            collections = ?staged.iter().map(|(collection, _, _)| collection.as_str()).collect::<Vec<_>>(),
            "committed snapshot batch"
        );
        Ok(())
    }

    /// Finishes an interrupted multi-collection commit and clears stray temps.
    /// Must run while holding the write lock.
    pub fn recover(&self) -> Result<RecoverySummary, StoreError> {
        let mut summary = RecoverySummary::default();
        let manifest_path = self.root.join(MANIFEST_FILE);

        if manifest_path.exists() {
            let raw = fs::read(&manifest_path).map_err(|source| StoreError::io(&manifest_path, source))?;
            match serde_json::from_slice::<CommitManifest>(&raw) {
                Ok(manifest) => {
                    for entry in &manifest.entries {
                        let temp = self.root.join(&entry.temp);
                        if temp.exists() {
                            let target = self.root.join(&entry.target);
                            fs::rename(&temp, &target)
                                .map_err(|source| StoreError::io(&target, source))?;
                            summary.rolled_forward += 1;
                        }
                    }
                    info!(
                        txn = %manifest.txn,
                        rolled_forward = summary.rolled_forward,
                        "recovered interrupted commit"
                    );
                }
                Err(err) => {
                    warn!(error = %err, "discarding unreadable commit manifest");
                }
            }
            fs::remove_file(&manifest_path).map_err(|source| StoreError::io(&manifest_path, source))?;
            sync_dir(&self.root).map_err(|source| StoreError::io(&self.root, source))?;
        }

        for temp in self.stray_temps()? {
            fs::remove_file(&temp).map_err(|source| StoreError::io(&temp, source))?;
            summary.removed_temps += 1;
        }

        Ok(summary)
    }

    pub fn pending_manifest(&self) -> bool {
        self.root.join(MANIFEST_FILE).exists()
    }

    pub fn stray_temps(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut temps = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(temps),
            Err(source) => return Err(StoreError::io(&self.root, source)),
        };
        for entry in entries {
            let path = entry.map_err(|source| StoreError::io(&self.root, source))?.path();
            let name = file_name_of(&path);
            if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) && path.is_file() {
                temps.push(path);
            }
        }
        temps.sort();
        Ok(temps)
    }

    fn preserve_unreadable(
        &self,
        collection: Collection,
        target: &Path,
        txn: &str,
    ) -> Result<(), StoreError> {
        if let Err(reason) = read_snapshot(target, collection) {
            let backup = self
                .root
                .join(format!("{}.corrupt-{}.json", collection.as_str(), txn));
            fs::copy(target, &backup).map_err(|source| StoreError::io(&backup, source))?;
            warn!(
                collection = %collection,
                backup = %backup.display(),
                reason = %reason,
                "preserved unreadable snapshot before replacing it"
            );
        }
        Ok(())
    }
}

fn encode_snapshot<R: Record>(collection: Collection, records: &[R]) -> Result<Vec<u8>, StoreError> {
    let value = serde_json::to_value(records)?;
    let envelope = SnapshotEnvelope {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        collection,
        written_at: now_utc_rfc3339(),
        checksum: checksum(&value)?,
        record_count: records.len(),
        records: value,
    };
    let mut bytes = serde_json::to_vec_pretty(&envelope)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// `Ok(None)` when the file does not exist, `Err(reason)` when it cannot be trusted.
fn read_snapshot(path: &Path, collection: Collection) -> Result<Option<Value>, String> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(format!("unable to read file: {}", err)),
    };
    let envelope: SnapshotEnvelope =
        serde_json::from_slice(&raw).map_err(|err| format!("invalid snapshot JSON: {}", err))?;
    if envelope.schema_version > SNAPSHOT_SCHEMA_VERSION {
        return Err(format!(
            "snapshot schema version {} is newer than supported {}",
            envelope.schema_version, SNAPSHOT_SCHEMA_VERSION
        ));
    }
    if envelope.collection != collection {
        return Err(format!(
            "snapshot holds collection '{}', expected '{}'",
            envelope.collection, collection
        ));
    }
    let actual = checksum(&envelope.records).map_err(|err| err.to_string())?;
    if actual != envelope.checksum {
        return Err(format!(
            "checksum mismatch: recorded {}, computed {}",
            envelope.checksum, actual
        ));
    }
    Ok(Some(envelope.records))
}

fn checksum(records: &Value) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(records)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn discard_temps(staged: &[(Collection, PathBuf, PathBuf)]) {
    for (_, temp, _) in staged {
        let _ = fs::remove_file(temp);
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug)]
pub enum StoreError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize(serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "storage I/O error at '{}': {}", path.display(), source)
            }
            StoreError::Serialize(err) => write!(f, "failed to serialize snapshot: {}", err),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Serialize(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialize(value)
    }
}

#[cfg(test)]
mod tests;
