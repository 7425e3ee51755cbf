use std::path::Path;

use serde::Serialize;

use crate::integrity::Catalog;
use crate::notify::NotificationIntent;
use crate::store::{Collection, SnapshotHealth, Store, StoreError, MANIFEST_FILE};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FsckIssue {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FsckReport {
    pub files_scanned: u64,
    pub issues: Vec<FsckIssue>,
}

impl FsckReport {
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Read-only check of a data directory. Nothing is repaired; an interrupted
/// commit is reported rather than rolled forward.
pub fn run_fsck(store: &Store) -> Result<FsckReport, StoreError> {
    let mut issues = Vec::new();
    let mut files_scanned = 0;

    for collection in Collection::ALL {
        let path = store.path_for(collection);
        match store.inspect(collection) {
            SnapshotHealth::Missing => {}
            SnapshotHealth::Readable { .. } => files_scanned += 1,
            SnapshotHealth::Unreadable { reason } => {
                files_scanned += 1;
                issues.push(issue(&path, &format!("unreadable snapshot: {}", reason)));
            }
        }
    }

    let catalog = Catalog::load(store);
    for (collection, key) in catalog.duplicate_keys() {
        issues.push(issue(
            &store.path_for(*collection),
            &format!("duplicate key '{}'", key),
        ));
    }
    for message in catalog.dangling_references() {
        issues.push(FsckIssue {
            path: store.root().display().to_string(),
            message,
        });
    }

    if store.pending_manifest() {
        issues.push(issue(
            &store.root().join(MANIFEST_FILE),
            "interrupted commit; the next write will roll it forward",
        ));
    }
    for temp in store.stray_temps()? {
        issues.push(issue(&temp, "leftover temporary file"));
    }

    let pending: Vec<NotificationIntent> = store.load_all();
    if !pending.is_empty() {
        issues.push(issue(
            &store.path_for(Collection::Outbox),
            &format!("{} notification(s) not yet delivered", pending.len()),
        ));
    }

    Ok(FsckReport {
        files_scanned,
        issues,
    })
}

fn issue(path: &Path, message: &str) -> FsckIssue {
    FsckIssue {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}
