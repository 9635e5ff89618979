//! Content-addressed cache of decoded audio buffers, keyed by absolute path
//! and modification time so a file edited on disk doesn't serve stale data.
//!
//! Unlike the original engine's process-wide singleton (`SamplePool::getInstance()`),
//! this is an explicit, disposable registry per §9 Open Questions — callers own
//! a `SamplePool` and can drop it, which drops every buffer with it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use crate::error::{EngineError, Result};

/// Identifies a cached buffer by file path and modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl SampleKey {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            modified: metadata.modified()?,
        })
    }
}

/// Decoded (or streaming-in-progress) audio held by the pool.
///
/// `ready` flips to `true` once `data` is fully populated; graph construction
/// skips clips referencing a not-ready buffer rather than blocking the RT
/// thread on a partial read (see `graph_builder`).
pub struct AudioBuffer {
    pub data: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
    pub num_frames: u64,
    pub is_streaming: bool,
    pub source_path: PathBuf,
    pub ready: AtomicBool,
    last_access_tick: AtomicU64,
}

impl AudioBuffer {
    pub fn new_ready(data: Vec<f32>, channels: usize, sample_rate: u32, source_path: PathBuf) -> Arc<Self> {
        let num_frames = if channels > 0 { data.len() as u64 / channels as u64 } else { 0 };
        Arc::new(Self {
            data,
            channels,
            sample_rate,
            num_frames,
            is_streaming: false,
            source_path,
            ready: AtomicBool::new(true),
            last_access_tick: AtomicU64::new(0),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn touch(&self, tick: u64) {
        self.last_access_tick.store(tick, Ordering::Relaxed);
    }
}

/// Content-addressed LRU-ish cache. Entries are held by `Weak` reference so a
/// buffer with no remaining strong holders (no clip currently renders it) is
/// eligible for eviction by `garbage_collect` without extra bookkeeping.
pub struct SamplePool {
    inner: Mutex<PoolInner>,
    /// Per-key lock held for the duration of a load, so a second `acquire`
    /// racing a miss on the same key waits on the first rather than decoding
    /// twice. Entries are removed once the winning load lands in `inner`.
    loading: Mutex<HashMap<SampleKey, Arc<Mutex<()>>>>,
    memory_budget_bytes: u64,
}

struct PoolInner {
    entries: HashMap<SampleKey, Weak<AudioBuffer>>,
    tick: u64,
}

impl SamplePool {
    pub fn new(memory_budget_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            loading: Mutex::new(HashMap::new()),
            memory_budget_bytes,
        }
    }

    fn try_get_cached(&self, key: &SampleKey) -> Option<Arc<AudioBuffer>> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let buf = inner.entries.get(key)?.upgrade()?;
        buf.touch(tick);
        Some(buf)
    }

    /// Fetch a cached buffer, or populate it via `loader` on a miss (or if the
    /// file's mtime moved on since the cache was populated). A concurrent
    /// `acquire` for the same key performs the load at most once; the losing
    /// threads wait for the winner and reuse its buffer.
    pub fn acquire(
        &self,
        path: impl AsRef<Path>,
        loader: impl FnOnce(&Path) -> Result<Arc<AudioBuffer>>,
    ) -> Result<Arc<AudioBuffer>> {
        let path = path.as_ref();
        let key = SampleKey::from_path(path)?;

        if let Some(buf) = self.try_get_cached(&key) {
            return Ok(buf);
        }

        let key_lock = self
            .loading
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = key_lock.lock();

        // Whoever got here first may already have populated the entry while
        // we waited on `key_lock`.
        if let Some(buf) = self.try_get_cached(&key) {
            self.loading.lock().remove(&key);
            return Ok(buf);
        }

        let buf = match loader(path) {
            Ok(buf) => buf,
            Err(e) => {
                self.loading.lock().remove(&key);
                return Err(e);
            }
        };

        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        buf.touch(tick);
        inner.entries.insert(key.clone(), Arc::downgrade(&buf));
        drop(inner);

        self.loading.lock().remove(&key);
        Ok(buf)
    }

    /// Drop dead weak entries and, if over budget, evict the least-recently
    /// touched buffers still alive (their strong refcount may keep them
    /// resident regardless; this only removes the pool's own tracking entry).
    pub fn garbage_collect(&self) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|_, weak| weak.strong_count() > 0);

        if self.memory_budget_bytes == 0 {
            return;
        }

        let mut live: Vec<(u64, u64, SampleKey)> = inner
            .entries
            .iter()
            .filter_map(|(k, weak)| {
                weak.upgrade().map(|buf| {
                    let bytes = (buf.data.len() * std::mem::size_of::<f32>()) as u64;
                    (buf.last_access_tick.load(Ordering::Relaxed), bytes, k.clone())
                })
            })
            .collect();

        live.sort_by_key(|(tick, _, _)| *tick);

        let mut total: u64 = live.iter().map(|(_, bytes, _)| bytes).sum();
        for (_, bytes, key) in live {
            if total <= self.memory_budget_bytes {
                break;
            }
            inner.entries.remove(&key);
            total = total.saturating_sub(bytes);
        }
    }

    pub fn memory_usage(&self) -> u64 {
        let inner = self.inner.lock();
        inner
            .entries
            .values()
            .filter_map(|weak| weak.upgrade())
            .map(|buf| (buf.data.len() * std::mem::size_of::<f32>()) as u64)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn missing_file_error(path: &Path) -> EngineError {
    EngineError::FileNotFound(path.to_path_buf())
}
