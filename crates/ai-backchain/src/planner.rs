//! Backward-chaining search driver.

use std::sync::Arc;

use ai_core::{FactStore, SnapshotService};

use crate::config::PlannerConfig;
use crate::error::{PlanError, Result};
use crate::evaluator::StateEvaluator;
use crate::graph::{Achievement, StateNodeId};
use crate::grounding::{AncestorContext, Grounder, Grounding, GroundingRequest};
use crate::plan::{self, Failure, FailureReason, PlanOutcome, SearchStats};
use crate::repository::RuleRepository;
use crate::rule::RuleId;
use crate::scoring;
use crate::session::{PlanningSession, SessionParts};
use crate::state::StateTemplate;

/// Reusable planner over a shared, read-only rule repository.
///
/// `plan` takes `&self`; concurrent calls each get their own session.
#[derive(Debug, Clone)]
pub struct Planner {
    repository: Arc<RuleRepository>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(repository: impl Into<Arc<RuleRepository>>) -> Self {
        Self {
            repository: repository.into(),
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(&self) -> &RuleRepository {
        &self.repository
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Search for an action sequence that makes every goal hold.
    ///
    /// Facts come from `store`; inquiries run against a private clone taken
    /// from `world`, released again on every exit path. An unreachable goal or
    /// an exhausted budget is `Ok(PlanOutcome::NotFound)`; `Err` means a rule
    /// or inquiry broke its contract.
    pub fn plan(
        &self,
        goals: &[StateTemplate],
        world: &dyn SnapshotService,
        store: &dyn FactStore,
    ) -> Result<PlanOutcome> {
        for goal in goals {
            goal.validate()?;
            if !goal.is_ground() {
                return Err(PlanError::Ungrounded {
                    state: goal.to_string(),
                });
            }
        }

        let mut session = PlanningSession::open(world, goals.to_vec());
        let parts = session.parts();
        let evaluator = StateEvaluator::new(parts.snapshot, store);
        let mut search = Search {
            repository: &self.repository,
            config: &self.config,
            evaluator,
            parts,
        };
        let outcome = search.run();
        if let Err(err) = &outcome {
            tracing::error!(error = %err, "planning aborted");
        }
        outcome
    }
}

#[derive(Debug)]
enum Phase {
    Scanning,
    Evaluating(StateNodeId),
    Selecting(StateNodeId),
    Extending {
        node: StateNodeId,
        grounding: Grounding,
    },
    Backtracking(StateNodeId),
    Success,
    Failure(FailureReason),
}

struct Search<'p, 's> {
    repository: &'p RuleRepository,
    config: &'p PlannerConfig,
    evaluator: StateEvaluator<'s>,
    parts: SessionParts<'s>,
}

impl Search<'_, '_> {
    fn run(&mut self) -> Result<PlanOutcome> {
        let mut phase = Phase::Scanning;
        loop {
            phase = match phase {
                Phase::Scanning => self.scan(),
                Phase::Evaluating(node) => self.evaluate(node)?,
                Phase::Selecting(node) => self.select(node)?,
                Phase::Extending { node, grounding } => self.extend(node, grounding),
                Phase::Backtracking(node) => self.backtrack(node),
                Phase::Success => {
                    let stats = self.finish_stats();
                    let plan = plan::extract(self.parts.graph, self.repository, stats);
                    tracing::debug!(
                        actions = plan.actions.len(),
                        steps = plan.steps.len(),
                        expansions = stats.expansions,
                        "plan found"
                    );
                    return Ok(PlanOutcome::Found(plan));
                }
                Phase::Failure(reason) => {
                    let stats = self.finish_stats();
                    tracing::debug!(reason = ?reason, expansions = stats.expansions, "no plan");
                    return Ok(PlanOutcome::NotFound(Failure { reason, stats }));
                }
            };
        }
    }

    fn finish_stats(&mut self) -> SearchStats {
        let stats = &mut *self.parts.stats;
        stats.inquiries = self.parts.cache.inquiries();
        stats.store_lookups = self.parts.cache.store_lookups();
        stats.depth = self.parts.graph.depth();
        *stats
    }

    /// First frontier node that is not yet known to hold.
    fn scan(&self) -> Phase {
        let graph = &*self.parts.graph;
        for &id in graph.frontier() {
            match graph.state(id).status {
                Achievement::Achieved => continue,
                Achievement::Unknown => return Phase::Evaluating(id),
                Achievement::NotAchieved => return Phase::Selecting(id),
            }
        }
        Phase::Success
    }

    fn evaluate(&mut self, id: StateNodeId) -> Result<Phase> {
        let state = &self.parts.graph.state(id).state;
        let evaluation = self.evaluator.evaluate(state, self.parts.cache)?;
        self.parts.stats.evaluations += 1;
        tracing::trace!(
            state = %state,
            satisfied = evaluation.satisfied,
            degree = evaluation.degree,
            "evaluated"
        );
        self.parts.graph.state_mut(id).status = if evaluation.satisfied {
            Achievement::Achieved
        } else {
            Achievement::NotAchieved
        };
        Ok(Phase::Scanning)
    }

    fn select(&mut self, id: StateNodeId) -> Result<Phase> {
        let node = self.parts.graph.state(id);
        if node.status != Achievement::NotAchieved {
            return Err(PlanError::UnexpectedStatus {
                state: node.state.to_string(),
                expected: Achievement::NotAchieved,
                found: node.status,
            });
        }
        if self.parts.graph.depth() >= self.config.max_depth {
            self.parts.stats.depth_refusals += 1;
            tracing::debug!(
                state = %node.state,
                depth = self.parts.graph.depth(),
                "depth budget reached"
            );
            return Ok(Phase::Backtracking(id));
        }

        if node.candidates.is_none() {
            let candidates = self.repository.candidates_for(node.state.name()).to_vec();
            self.parts.graph.state_mut(id).candidates = Some(candidates);
        }

        while let Some(rule_id) = self.pick_candidate(id) {
            let node = self.parts.graph.state_mut(id);
            *node.trials.entry(rule_id).or_insert(0) += 1;

            if let Some(grounding) = self.ground(id, rule_id)? {
                return Ok(Phase::Extending { node: id, grounding });
            }
        }
        tracing::trace!(state = %self.parts.graph.state(id).state, "candidates exhausted");
        Ok(Phase::Backtracking(id))
    }

    /// Remove and return the best-scoring untried rule; the rest stay queued
    /// in descending score order.
    fn pick_candidate(&mut self, id: StateNodeId) -> Option<RuleId> {
        let weights = &self.config.scoring;
        let node = self.parts.graph.state_mut(id);
        let queue = node.candidates.take().unwrap_or_default();
        let scored = queue
            .into_iter()
            .map(|candidate| {
                let rule = self.repository.rule(candidate.rule);
                let score = scoring::score(
                    weights,
                    node.trials_of(candidate.rule),
                    candidate.probability,
                    rule.base_cost(),
                    rule.is_recursive(),
                );
                (candidate, score)
            })
            .collect();
        let mut ranked = scoring::rank_by_score(scored);
        let picked = if ranked.is_empty() {
            None
        } else {
            Some(ranked.remove(0))
        };
        node.candidates = Some(ranked);
        picked.map(|candidate| candidate.rule)
    }

    fn ground(
        &mut self,
        id: StateNodeId,
        rule_id: RuleId,
    ) -> Result<Option<Grounding>> {
        let graph = &*self.parts.graph;
        let node = graph.state(id);
        let forward_chain: Vec<StateTemplate> = graph
            .forward_chain(id)
            .into_iter()
            .map(|chained| graph.state(chained).state.clone())
            .collect();
        let protected: Vec<StateTemplate> = graph
            .frontier()
            .iter()
            .filter(|&&other| other != id)
            .map(|&other| graph.state(other).state.clone())
            .collect();
        let ancestor = graph.nearest_concrete_ancestor(id).and_then(|ancestor| {
            let grounding = graph.rule(ancestor.rule).grounding()?;
            let rule = self.repository.rule(grounding.rule);
            let link = rule
                .preconditions()
                .get(graph.state(ancestor.link).origin?)?;
            Some(AncestorContext {
                rule,
                link,
                grounding,
            })
        });

        let request = GroundingRequest {
            rule_id,
            rule: self.repository.rule(rule_id),
            forward: &node.state,
            forward_chain: &forward_chain,
            protected: &protected,
            ancestor,
            attempted: &node.attempted,
        };
        let grounder = Grounder::new(&self.evaluator, self.config.max_binding_candidates);
        grounder.ground(&request, self.parts.cache)
    }

    fn extend(&mut self, id: StateNodeId, grounding: Grounding) -> Phase {
        if self.parts.stats.expansions >= self.config.max_expansions {
            return Phase::Failure(FailureReason::BudgetExhausted {
                expansions: self.parts.stats.expansions,
            });
        }

        let rule = self.repository.rule(grounding.rule);
        let preconditions = rule
            .preconditions()
            .iter()
            .map(|pre| pre.ground(&grounding.bindings))
            .collect();
        tracing::debug!(
            rule = rule.name(),
            state = %self.parts.graph.state(id).state,
            layer = self.parts.graph.depth() + 1,
            "extending"
        );

        let graph = &mut *self.parts.graph;
        graph
            .state_mut(id)
            .attempted
            .insert((grounding.rule, grounding.bindings.clone()));
        let siblings: Vec<StateNodeId> = graph
            .frontier()
            .iter()
            .copied()
            .filter(|&other| other != id)
            .collect();
        graph.extend(id, grounding, preconditions);
        for sibling in siblings {
            graph.carry_forward(sibling);
        }

        let stats = &mut *self.parts.stats;
        stats.expansions += 1;
        stats.max_depth = stats.max_depth.max(graph.depth());
        Phase::Scanning
    }

    /// Undo the nearest concrete rule above an exhausted node: rebind it if it
    /// has alternatives left, otherwise drop it and reselect for its state.
    fn backtrack(&mut self, id: StateNodeId) -> Phase {
        self.parts.stats.backtracks += 1;
        let graph = &mut *self.parts.graph;
        let Some(ancestor) = graph.nearest_concrete_ancestor(id) else {
            let goal = graph.state(id).state.to_string();
            if self.parts.stats.depth_refusals > 0 {
                tracing::debug!(goal = %goal, max_depth = self.config.max_depth, "depth budget exhausted");
                return Phase::Failure(FailureReason::DepthExhausted {
                    goal,
                    max_depth: self.config.max_depth,
                });
            }
            tracing::debug!(goal = %goal, "goal unreachable");
            return Phase::Failure(FailureReason::Unreachable { goal });
        };

        let Some(grounding) = graph.rule(ancestor.rule).grounding().cloned() else {
            return Phase::Failure(FailureReason::Unreachable {
                goal: graph.state(id).state.to_string(),
            });
        };
        let produced = ancestor.produced;
        let layer = graph.state(produced).layer;

        let attempted = &graph.state(produced).attempted;
        let mut remaining = grounding.remaining.clone();
        let mut next = None;
        while !remaining.is_empty() {
            let candidate = remaining.remove(0);
            if !attempted.contains(&(grounding.rule, candidate.clone())) {
                next = Some(candidate);
                break;
            }
        }

        graph.truncate_behind(layer);
        match next {
            Some(bindings) => {
                self.parts.stats.rebinds += 1;
                tracing::debug!(
                    rule = self.repository.rule(grounding.rule).name(),
                    alternatives = remaining.len(),
                    "rebinding"
                );
                Phase::Extending {
                    node: produced,
                    grounding: grounding.rebind(bindings, remaining),
                }
            }
            None => {
                tracing::trace!(
                    rule = self.repository.rule(grounding.rule).name(),
                    "rule node exhausted"
                );
                Phase::Selecting(produced)
            }
        }
    }
}
