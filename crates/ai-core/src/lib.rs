//! Engine-agnostic planning vocabulary: values, world snapshots and plan specs.
//!
//! Planners (such as `ai-backchain`) read facts through [`FactStore`] and
//! hypothetical snapshots through [`SnapshotService`], and hand a
//! [`PlanSpec`] of [`ActionSpec`]s to whatever executes actions.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod plan;
pub mod value;
pub mod world;

pub use plan::{ActionSpec, PlanSpec};
pub use value::{Value, ValueType, Vec3};
pub use world::{FactKey, FactStore, SharedWorld, SnapshotService, WorldState};
