//! Double-buffered handoff of the render graph from UI/builder threads to
//! the RT thread, grounded on `NomadAudio/include/EngineState.h`.
//!
//! Two graph slots plus one atomic index. The RT thread only ever reads
//! `active_graph()`; the builder mutates the *inactive* slot, then swaps.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::graph::AudioGraph;

pub struct EngineState {
    graphs: [AudioGraph; 2],
    active_index: AtomicUsize,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            graphs: [AudioGraph::new(), AudioGraph::new()],
            active_index: AtomicUsize::new(0),
        }
    }

    /// Read the currently-active graph. Safe to call from the RT thread.
    pub fn active_graph(&self) -> &AudioGraph {
        let idx = self.active_index.load(Ordering::Acquire);
        &self.graphs[idx]
    }

    /// Index of the slot NOT currently active, for the builder to mutate.
    fn inactive_index(&self) -> usize {
        1 - self.active_index.load(Ordering::Acquire)
    }

    /// Copy `next` into the inactive slot and publish it as active.
    ///
    /// # Safety
    /// Must only be called from a single non-RT "builder" context at a
    /// time — concurrent `swap_graph` calls would race on the inactive
    /// slot. The RT thread only reads, so it's never a participant here.
    pub fn swap_graph(&self, next: AudioGraph) {
        let idx = self.inactive_index();
        // SAFETY: `idx` is the slot the RT thread is not reading from,
        // since `active_index` still points at the other slot until the
        // release-store below flips it.
        let slot = &self.graphs[idx] as *const AudioGraph as *mut AudioGraph;
        unsafe {
            *slot = next;
        }
        self.active_index.store(idx, Ordering::Release);
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the only mutation path (`swap_graph`) writes exclusively to the
// slot not currently exposed by `active_graph`, and publishes visibility
// via a release store paired with the acquire load in `active_graph`.
unsafe impl Sync for EngineState {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_empty_graph() {
        let state = EngineState::new();
        assert!(state.active_graph().tracks.is_empty());
    }

    #[test]
    fn test_swap_publishes_new_graph() {
        let state = EngineState::new();
        let mut graph = AudioGraph::new();
        graph.timeline_end_sample = 4096;
        state.swap_graph(graph);
        assert_eq!(state.active_graph().timeline_end_sample, 4096);
    }

    #[test]
    fn test_repeated_swaps_alternate_slots_without_corruption() {
        let state = EngineState::new();
        for i in 0..10u64 {
            let mut graph = AudioGraph::new();
            graph.timeline_end_sample = i;
            state.swap_graph(graph);
            assert_eq!(state.active_graph().timeline_end_sample, i);
        }
    }
}
