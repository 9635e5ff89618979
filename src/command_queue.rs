//! Bounded, lock-free-to-the-consumer queue of parameter changes from the UI
//! thread to the RT thread. Producers serialize through a `parking_lot`
//! mutex (cheap, uncontended in practice since UI edits are infrequent
//! relative to audio callback rate); the RT thread drains without locking.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// A single parameter change applied atomically by the RT thread at the
/// start of the next block it processes.
///
/// Tracks are addressed by `track_index`, their position in the project's
/// track list, rather than by the `Uuid` used for the clip/track's lane
/// identity — the RT thread resolves a command against the graph snapshot's
/// numeric index, not a UUID lookup.
#[derive(Debug, Clone, Copy)]
pub enum Command {
    SetTrackVolume { track_index: usize, volume: f32 },
    SetTrackPan { track_index: usize, pan: f32 },
    SetTrackMute { track_index: usize, mute: bool },
    SetTrackSolo { track_index: usize, solo: bool },
    SetTransportPlaying(bool),
    SeekTo { timeline_frame: u64 },
}

/// Fixed-capacity SPSC-consumer queue. Multiple producer threads may call
/// `push`, serialized by an internal mutex; exactly one consumer calls
/// `drain_into` per RT block.
pub struct CommandQueue {
    inner: Mutex<Vec<Command>>,
    capacity: usize,
    dropped: AtomicUsize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Enqueue a command. If the queue is full, the command is dropped and
    /// counted — callers should prefer coalescing (e.g. only the latest
    /// volume change matters) over letting the queue back up.
    pub fn push(&self, command: Command) {
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        guard.push(command);
    }

    /// Drain all pending commands into `out`, applying them in FIFO order.
    /// Called once per RT block, before rendering.
    pub fn drain_into(&self, out: &mut Vec<Command>) {
        let mut guard = self.inner.lock();
        out.extend(guard.drain(..));
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
