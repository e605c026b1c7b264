// SPDX-License-Identifier: MIT

//! File-backed account store with atomic replace and backup rotation.

use crate::record::AccountRecord;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    // Remove the oldest if at capacity
    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    // Shift existing backups up by one
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

/// Pending write for one account's single-writer slot.
#[derive(Debug, Default)]
struct SaveSlot {
    /// Newest record awaiting a write; a burst of saves coalesces here.
    queued: Option<AccountRecord>,
    /// A writer task is draining this slot.
    running: bool,
}

/// Durable store: one `<account>.json` per account under a data directory.
#[derive(Debug)]
pub struct AccountStore {
    dir: PathBuf,
    slots: Mutex<HashMap<String, SaveSlot>>,
    idle: Notify,
}

impl AccountStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), slots: Mutex::new(HashMap::new()), idle: Notify::new() }
    }

    pub fn path_for(&self, account: &str) -> PathBuf {
        // Account names come from operator config; only path separators need
        // neutralizing.
        let safe: String =
            account.chars().map(|c| if c == '/' || c == '\\' { '_' } else { c }).collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// Load the record for an account. Missing file is not an error.
    pub fn load(&self, account: &str) -> Result<Option<AccountRecord>, StoreError> {
        let path = self.path_for(account);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Load, falling back to an empty record on a corrupt file. The corrupt
    /// file is rotated aside so the next save does not bury the evidence.
    pub fn load_or_default(&self, account: &str) -> AccountRecord {
        match self.load(account) {
            Ok(Some(record)) => record,
            Ok(None) => AccountRecord::default(),
            Err(e) => {
                tracing::warn!(account, error = %e, "corrupt account record, starting fresh");
                let path = self.path_for(account);
                let _ = fs::rename(&path, rotate_bak_path(&path));
                AccountRecord::default()
            }
        }
    }

    /// Save atomically: write to a temp file, rotate the previous file to a
    /// backup, rename the temp into place.
    pub fn save(&self, account: &str, record: &AccountRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(account);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        if path.exists() {
            let _ = fs::copy(&path, rotate_bak_path(&path));
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Fire-and-forget save. Errors are logged, never surfaced: in-memory
    /// state stays authoritative within the process.
    ///
    /// Saves for one account go through a single writer slot: only one
    /// blocking task writes at a time, and a burst of saves coalesces to
    /// the newest record, so an older snapshot can never land after a
    /// newer one.
    pub fn save_async(self: &Arc<Self>, account: &str, record: AccountRecord) {
        let spawn_writer = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(account.to_string()).or_default();
            slot.queued = Some(record);
            if slot.running {
                false
            } else {
                slot.running = true;
                true
            }
        };
        if spawn_writer {
            let store = Arc::clone(self);
            let account = account.to_string();
            tokio::task::spawn_blocking(move || store.drain_saves(&account));
        }
    }

    /// Writer body: keep taking the newest queued record until the slot is
    /// empty, then step down under the same lock `save_async` uses so no
    /// queued record is ever stranded.
    fn drain_saves(&self, account: &str) {
        loop {
            let record = {
                let mut slots = self.slots.lock();
                match slots.get_mut(account).and_then(|slot| slot.queued.take()) {
                    Some(record) => record,
                    None => {
                        if let Some(slot) = slots.get_mut(account) {
                            slot.running = false;
                        }
                        break;
                    }
                }
            };
            if let Err(e) = self.save(account, &record) {
                tracing::warn!(account, error = %e, "failed to persist account record");
            }
        }
        self.idle.notify_waiters();
    }

    fn is_idle(&self) -> bool {
        self.slots.lock().values().all(|slot| !slot.running && slot.queued.is_none())
    }

    /// Wait until every pending save has hit disk.
    pub async fn flush(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            // Register before the idle check so a writer finishing in
            // between cannot be missed
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
