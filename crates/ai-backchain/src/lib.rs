//! Backward-chaining layered planner.
//!
//! Given goal [`StateTemplate`]s, a [`RuleRepository`] and a view of the world,
//! [`Planner::plan`] grows a chain of alternating state and rule layers from
//! the goals back toward the current world, grounding one rule per layer, and
//! returns the grounded actions of the chain as an `ai_core::PlanSpec`.
//!
//! ```no_run
//! use ai_backchain::{embodiment, Comparison, Planner};
//! use ai_core::{SharedWorld, Value, WorldState};
//!
//! # fn main() -> Result<(), ai_backchain::PlanError> {
//! let planner = Planner::new(embodiment::repository("avatar")?);
//! let world = SharedWorld::new(WorldState::new());
//! let store = WorldState::new();
//! let goal = embodiment::energy(Value::entity("avatar").into(), Comparison::GreaterThan, 0.8);
//! let outcome = planner.plan(&[goal], &world, &store)?;
//! if let Some(plan) = outcome.plan() {
//!     for action in plan.actions.iter() {
//!         println!("{action}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod config;
pub mod embodiment;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod grounding;
pub mod plan;
pub mod planner;
pub mod repository;
pub mod rule;
pub mod scoring;
mod session;
pub mod state;

pub use config::{PlannerConfig, ScoringWeights};
pub use error::{PlanError, Result};
pub use evaluator::{Evaluation, EvaluationCache, StateEvaluator};
pub use graph::Achievement;
pub use plan::{Failure, FailureReason, GroundedEffect, Plan, PlanOutcome, PlanStep, SearchStats};
pub use planner::Planner;
pub use repository::{Candidate, RuleRepository};
pub use rule::{ActionTemplate, Effect, Mutation, Rule, RuleId};
pub use state::{Bindings, Comparison, Inquiry, StateTemplate, Term, Variable};
