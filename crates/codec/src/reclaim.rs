//! Deterministic teardown of composed media handles.
//!
//! A composition may share children or, through [`MediaGraph::link_child`],
//! even reference itself. Release walks the graph once with a visited set,
//! closes each node's resources in a fixed order (primary reader, audio
//! sub-resource, mask sub-resource), and clears child lists so nothing keeps
//! a dangling reference. Failures are logged and counted, never returned.

use std::collections::HashSet;

use crate::graph::{MediaGraph, MediaId};

/// What a release pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseStats {
    /// Nodes that went from live to released.
    pub released: usize,
    /// Readers closed successfully.
    pub readers_closed: usize,
    /// Close failures that were logged and suppressed.
    pub failures: usize,
}

impl ReleaseStats {
    fn absorb(&mut self, other: ReleaseStats) {
        self.released += other.released;
        self.readers_closed += other.readers_closed;
        self.failures += other.failures;
    }
}

/// Release `id` and everything it owns. Unknown or already released ids
/// are a no-op.
pub fn release(graph: &mut MediaGraph, id: MediaId) -> ReleaseStats {
    let mut visited = HashSet::new();
    let mut stats = ReleaseStats::default();
    release_node(graph, id, &mut visited, &mut stats);
    if stats.failures > 0 {
        tracing::warn!(
            handle = %id,
            failures = stats.failures,
            "Some media resources failed to close"
        );
    }
    stats
}

/// Release every live root in the graph.
pub fn release_all(graph: &mut MediaGraph) -> ReleaseStats {
    let mut total = ReleaseStats::default();
    for root in graph.live_roots() {
        total.absorb(release(graph, root));
    }
    // Nodes on a cycle have no root; sweep whatever is still live.
    for index in 0..graph.len() {
        let id = MediaId(index as u32);
        if graph.get(id).is_some_and(|n| !n.is_released()) {
            total.absorb(release(graph, id));
        }
    }
    total
}

fn release_node(
    graph: &mut MediaGraph,
    id: MediaId,
    visited: &mut HashSet<MediaId>,
    stats: &mut ReleaseStats,
) {
    if !visited.insert(id) {
        return;
    }

    let Some(node) = graph.get_mut(id) else {
        tracing::trace!(handle = %id, "Release of unknown handle ignored");
        return;
    };

    if let Some(mut reader) = node.reader.take() {
        match reader.close() {
            Ok(()) => stats.readers_closed += 1,
            Err(e) => {
                stats.failures += 1;
                tracing::warn!(handle = %id, error = %e, "Failed to close media reader");
            }
        }
    }

    let audio = node.audio.take();
    let mask = node.mask.take();
    let children = std::mem::take(&mut node.children);
    if !node.released {
        node.released = true;
        stats.released += 1;
    }

    for sub in [audio, mask].into_iter().flatten() {
        if sub != id {
            release_node(graph, sub, visited, stats);
        }
    }

    for child in children {
        if child == id {
            tracing::debug!(handle = %id, "Skipping self-referencing child");
            continue;
        }
        release_node(graph, child, visited, stats);
    }
}
