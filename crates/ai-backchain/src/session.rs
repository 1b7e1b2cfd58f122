//! Per-call planning state.

use ai_core::{SnapshotService, WorldState};

use crate::evaluator::EvaluationCache;
use crate::graph::PlanningGraph;
use crate::plan::SearchStats;
use crate::state::StateTemplate;

/// Private snapshot clone, handed back to its service when dropped.
struct SnapshotGuard<'w> {
    service: &'w dyn SnapshotService,
    snapshot: WorldState,
}

impl<'w> SnapshotGuard<'w> {
    fn acquire(service: &'w dyn SnapshotService) -> Self {
        let snapshot = service.clone_latest();
        tracing::debug!(facts = snapshot.len(), "acquired planning snapshot");
        Self { service, snapshot }
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        self.service.release(std::mem::take(&mut self.snapshot));
        tracing::debug!("released planning snapshot");
    }
}

/// Everything one `plan` call owns: the snapshot, the evaluation cache, the
/// graph and the counters. Nothing here outlives the call.
pub(crate) struct PlanningSession<'w> {
    snapshot: SnapshotGuard<'w>,
    cache: EvaluationCache,
    graph: PlanningGraph,
    stats: SearchStats,
}

pub(crate) struct SessionParts<'s> {
    pub snapshot: &'s WorldState,
    pub cache: &'s mut EvaluationCache,
    pub graph: &'s mut PlanningGraph,
    pub stats: &'s mut SearchStats,
}

impl<'w> PlanningSession<'w> {
    pub(crate) fn open(world: &'w dyn SnapshotService, goals: Vec<StateTemplate>) -> Self {
        Self {
            snapshot: SnapshotGuard::acquire(world),
            cache: EvaluationCache::new(),
            graph: PlanningGraph::with_goals(goals),
            stats: SearchStats::default(),
        }
    }

    pub(crate) fn parts(&mut self) -> SessionParts<'_> {
        SessionParts {
            snapshot: &self.snapshot.snapshot,
            cache: &mut self.cache,
            graph: &mut self.graph,
            stats: &mut self.stats,
        }
    }
}
