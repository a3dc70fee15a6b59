// Copyright (c) 2026 TrustPlane Contributors
// SPDX-License-Identifier: Apache-2.0

//! Key/value backends for the history layer.
//!
//! Two flavors exist: [`FsStore`] persists under a data directory and is
//! used by the standalone coordinator, [`MemStore`] is the in-process
//! flavor whose `watch` streams real change events. Both satisfy the same
//! semantics; the history layer stays backend-agnostic.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{TrustPlaneError, TrustPlaneResult};

const LOCK_FILE: &str = "coordinator.lock";

/// Change-notification handle returned by [`Store::watch`].
///
/// Watches are an optimization hint only; correctness never depends on an
/// event firing. Dropping the handle cancels the watch.
pub struct Watch {
    pub events: Receiver<Vec<u8>>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Watch {
    fn new(events: Receiver<Vec<u8>>, cancel: Option<Box<dyn FnOnce() + Send>>) -> Self {
        Self { events, cancel }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Flat key/value backend with per-key compare-and-swap.
///
/// `compare_and_swap` must be atomic at single-key granularity: the swap
/// succeeds only if the current value equals `old`, where an empty `old`
/// means "key absent or empty". Conflicts surface as
/// [`TrustPlaneError::CasConflict`].
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> TrustPlaneResult<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]) -> TrustPlaneResult<()>;
    fn compare_and_swap(&self, key: &str, old: &[u8], new: &[u8]) -> TrustPlaneResult<()>;
    fn has(&self, key: &str) -> TrustPlaneResult<bool>;
    fn watch(&self, key: &str) -> TrustPlaneResult<Watch>;
}

fn validate_key(key: &str) -> TrustPlaneResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(TrustPlaneError::InvalidArgument(format!(
            "invalid store key: {key:?}"
        )));
    }
    Ok(())
}

/// Filesystem-backed store rooted at a data directory.
///
/// An exclusive `coordinator.lock` file rejects a second process on the
/// same directory. There is no OS-level change notification, so `watch`
/// returns a channel that never fires.
pub struct FsStore {
    root: PathBuf,
    // Serializes read-modify-write so compare_and_swap is atomic per key.
    cas: Mutex<()>,
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> TrustPlaneResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|err| TrustPlaneError::Internal(format!("mkdir {}: {err}", root.display())))?;
        OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(root.join(LOCK_FILE))
            .map_err(|_| {
                TrustPlaneError::Internal(format!(
                    "another coordinator already holds {}",
                    root.join(LOCK_FILE).display()
                ))
            })?;
        Ok(Self {
            root,
            cas: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn read_current(&self, key: &str) -> TrustPlaneResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TrustPlaneError::Internal(format!("read {key}: {err}"))),
        }
    }

    fn write_atomic(&self, key: &str, value: &[u8]) -> TrustPlaneResult<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| TrustPlaneError::Internal(format!("mkdir for {key}: {err}")))?;
        }
        let tmp = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|err| TrustPlaneError::Internal(format!("open {key}: {err}")))?;
        file.write_all(value)
            .map_err(|err| TrustPlaneError::Internal(format!("write {key}: {err}")))?;
        file.sync_all()
            .map_err(|err| TrustPlaneError::Internal(format!("sync {key}: {err}")))?;
        fs::rename(&tmp, &path)
            .map_err(|err| TrustPlaneError::Internal(format!("rename {key}: {err}")))
    }
}

impl Drop for FsStore {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.root.join(LOCK_FILE));
    }
}

impl Store for FsStore {
    fn get(&self, key: &str) -> TrustPlaneResult<Vec<u8>> {
        validate_key(key)?;
        self.read_current(key)?
            .ok_or_else(|| TrustPlaneError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> TrustPlaneResult<()> {
        validate_key(key)?;
        let _guard = self.cas.lock();
        self.write_atomic(key, value)
    }

    fn compare_and_swap(&self, key: &str, old: &[u8], new: &[u8]) -> TrustPlaneResult<()> {
        validate_key(key)?;
        let _guard = self.cas.lock();
        let current = self.read_current(key)?.unwrap_or_default();
        if current != old {
            return Err(TrustPlaneError::CasConflict);
        }
        self.write_atomic(key, new)
    }

    fn has(&self, key: &str) -> TrustPlaneResult<bool> {
        validate_key(key)?;
        Ok(self.read_current(key)?.is_some())
    }

    fn watch(&self, key: &str) -> TrustPlaneResult<Watch> {
        validate_key(key)?;
        // No inotify plumbing; keep the sender alive until cancellation so
        // the channel stays open but silent.
        let (tx, rx) = channel::<Vec<u8>>();
        Ok(Watch::new(rx, Some(Box::new(move || drop(tx)))))
    }
}

#[derive(Default)]
struct MemInner {
    values: HashMap<String, Vec<u8>>,
    watchers: HashMap<String, Vec<(u64, Sender<Vec<u8>>)>>,
    next_watcher: u64,
}

impl MemInner {
    fn notify(&mut self, key: &str, value: &[u8]) {
        if let Some(watchers) = self.watchers.get_mut(key) {
            watchers.retain(|(_, tx)| tx.send(value.to_vec()).is_ok());
        }
    }
}

/// In-memory store. Used embedded and in tests; its `watch` streams every
/// accepted write for the key.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn get(&self, key: &str) -> TrustPlaneResult<Vec<u8>> {
        validate_key(key)?;
        self.inner
            .lock()
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| TrustPlaneError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> TrustPlaneResult<()> {
        validate_key(key)?;
        let mut inner = self.inner.lock();
        inner.values.insert(key.to_string(), value.to_vec());
        inner.notify(key, value);
        Ok(())
    }

    fn compare_and_swap(&self, key: &str, old: &[u8], new: &[u8]) -> TrustPlaneResult<()> {
        validate_key(key)?;
        let mut inner = self.inner.lock();
        let current = inner.values.get(key).cloned().unwrap_or_default();
        if current != old {
            return Err(TrustPlaneError::CasConflict);
        }
        inner.values.insert(key.to_string(), new.to_vec());
        inner.notify(key, new);
        Ok(())
    }

    fn has(&self, key: &str) -> TrustPlaneResult<bool> {
        validate_key(key)?;
        Ok(self.inner.lock().values.contains_key(key))
    }

    fn watch(&self, key: &str) -> TrustPlaneResult<Watch> {
        validate_key(key)?;
        let (tx, rx) = channel();
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_watcher;
            inner.next_watcher += 1;
            inner
                .watchers
                .entry(key.to_string())
                .or_default()
                .push((id, tx));
            id
        };
        let key = key.to_string();
        let weak = Arc::downgrade(&self.inner);
        Ok(Watch::new(
            rx,
            Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Some(watchers) = inner.lock().watchers.get_mut(&key) {
                        watchers.retain(|(watcher_id, _)| *watcher_id != id);
                    }
                }
            })),
        ))
    }
}
