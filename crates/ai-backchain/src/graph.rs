//! Layered planning graph.
//!
//! State layers and rule layers alternate. State layer 0 holds the goals; rule
//! layer `k` sits between state layer `k` (toward the goal, "forward") and
//! state layer `k + 1` (toward the current world, "backward"). Nodes live in
//! two arenas and reference each other by index. Nodes are allocated in layer
//! order, so dropping every layer behind a given one is an arena truncation.

use std::collections::{BTreeMap, BTreeSet};

use crate::grounding::Grounding;
use crate::repository::Candidate;
use crate::rule::RuleId;
use crate::state::{Bindings, StateTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateNodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleNodeId(u32);

impl StateNodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl RuleNodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Achievement {
    Unknown,
    Achieved,
    NotAchieved,
}

#[derive(Debug, Clone)]
pub struct StateLayerNode {
    pub state: StateTemplate,
    pub status: Achievement,
    /// Rule node in the backward neighbour layer that produces this state.
    pub producer: Option<RuleNodeId>,
    /// Rule node in the forward neighbour layer that needs this state.
    pub consumer: Option<RuleNodeId>,
    /// Precondition index inside the consumer's rule; `None` for carried clones.
    pub origin: Option<usize>,
    /// Untried producer rules; filled on first selection.
    pub candidates: Option<Vec<Candidate>>,
    pub trials: BTreeMap<RuleId, u32>,
    pub attempted: BTreeSet<(RuleId, Bindings)>,
    pub layer: usize,
}

impl StateLayerNode {
    fn new(state: StateTemplate, layer: usize) -> Self {
        Self {
            state,
            status: Achievement::Unknown,
            producer: None,
            consumer: None,
            origin: None,
            candidates: None,
            trials: BTreeMap::new(),
            attempted: BTreeSet::new(),
            layer,
        }
    }

    pub fn trials_of(&self, rule: RuleId) -> u32 {
        self.trials.get(&rule).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleRef {
    /// Carries a state one layer backward unchanged.
    Passthrough,
    Concrete(RuleId),
}

#[derive(Debug, Clone)]
pub enum RuleNodeKind {
    Passthrough,
    Concrete(Grounding),
}

#[derive(Debug, Clone)]
pub struct RuleLayerNode {
    pub kind: RuleNodeKind,
    pub produces: Vec<StateNodeId>,
    pub requires: Vec<StateNodeId>,
    pub layer: usize,
}

impl RuleLayerNode {
    pub fn rule_ref(&self) -> RuleRef {
        match &self.kind {
            RuleNodeKind::Passthrough => RuleRef::Passthrough,
            RuleNodeKind::Concrete(grounding) => RuleRef::Concrete(grounding.rule),
        }
    }

    pub fn grounding(&self) -> Option<&Grounding> {
        match &self.kind {
            RuleNodeKind::Concrete(grounding) => Some(grounding),
            RuleNodeKind::Passthrough => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StateLayer {
    nodes: Vec<StateNodeId>,
}

#[derive(Debug, Clone, Default)]
struct RuleLayer {
    nodes: Vec<RuleNodeId>,
}

/// The concrete rule node a state ultimately feeds, seen from that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ancestor {
    pub rule: RuleNodeId,
    /// State node the ancestor rule produces (in the rule's forward layer).
    pub produced: StateNodeId,
    /// Precondition node of the ancestor rule that the walk arrived through.
    pub link: StateNodeId,
}

#[derive(Debug, Clone)]
pub struct PlanningGraph {
    states: Vec<StateLayerNode>,
    rules: Vec<RuleLayerNode>,
    state_layers: Vec<StateLayer>,
    rule_layers: Vec<RuleLayer>,
}

impl PlanningGraph {
    pub fn with_goals(goals: impl IntoIterator<Item = StateTemplate>) -> Self {
        let mut graph = Self {
            states: Vec::new(),
            rules: Vec::new(),
            state_layers: vec![StateLayer::default()],
            rule_layers: Vec::new(),
        };
        for goal in goals {
            let id = graph.alloc_state(StateLayerNode::new(goal, 0));
            graph.state_layers[0].nodes.push(id);
        }
        graph
    }

    fn alloc_state(&mut self, node: StateLayerNode) -> StateNodeId {
        let id = StateNodeId(self.states.len() as u32);
        self.states.push(node);
        id
    }

    fn alloc_rule(&mut self, node: RuleLayerNode) -> RuleNodeId {
        let id = RuleNodeId(self.rules.len() as u32);
        self.rules.push(node);
        id
    }

    pub fn state(&self, id: StateNodeId) -> &StateLayerNode {
        &self.states[id.index()]
    }

    pub fn state_mut(&mut self, id: StateNodeId) -> &mut StateLayerNode {
        &mut self.states[id.index()]
    }

    pub fn rule(&self, id: RuleNodeId) -> &RuleLayerNode {
        &self.rules[id.index()]
    }

    /// Number of rule layers.
    pub fn depth(&self) -> usize {
        self.rule_layers.len()
    }

    pub fn goals(&self) -> &[StateNodeId] {
        &self.state_layers[0].nodes
    }

    /// Nodes of the backmost state layer.
    pub fn frontier(&self) -> &[StateNodeId] {
        let last = self.state_layers.len() - 1;
        &self.state_layers[last].nodes
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Open a new backward layer pair with `grounding` producing `target` and
    /// one state node per grounded precondition.
    ///
    /// `target` must be in the frontier layer.
    pub fn extend(
        &mut self,
        target: StateNodeId,
        grounding: Grounding,
        preconditions: Vec<StateTemplate>,
    ) -> RuleNodeId {
        let rule_layer = self.rule_layers.len();
        debug_assert_eq!(self.state(target).layer, rule_layer);
        self.rule_layers.push(RuleLayer::default());
        self.state_layers.push(StateLayer::default());

        let rule = self.alloc_rule(RuleLayerNode {
            kind: RuleNodeKind::Concrete(grounding),
            produces: vec![target],
            requires: Vec::new(),
            layer: rule_layer,
        });
        self.rule_layers[rule_layer].nodes.push(rule);
        self.state_mut(target).producer = Some(rule);

        for (index, state) in preconditions.into_iter().enumerate() {
            let mut node = StateLayerNode::new(state, rule_layer + 1);
            node.consumer = Some(rule);
            node.origin = Some(index);
            let id = self.alloc_state(node);
            self.state_layers[rule_layer + 1].nodes.push(id);
            self.rules[rule.index()].requires.push(id);
        }
        rule
    }

    /// Clone `source` into the backward layer behind it through a passthrough
    /// rule node. The clone keeps status, untried producers, trial counts and
    /// attempted bindings.
    pub fn carry_forward(&mut self, source: StateNodeId) -> StateNodeId {
        let layer = self.state(source).layer;
        debug_assert!(layer < self.rule_layers.len());

        let rule = self.alloc_rule(RuleLayerNode {
            kind: RuleNodeKind::Passthrough,
            produces: vec![source],
            requires: Vec::new(),
            layer,
        });
        self.rule_layers[layer].nodes.push(rule);

        let original = self.state(source);
        let clone = StateLayerNode {
            state: original.state.clone(),
            status: original.status,
            producer: None,
            consumer: Some(rule),
            origin: None,
            candidates: original.candidates.clone(),
            trials: original.trials.clone(),
            attempted: original.attempted.clone(),
            layer: layer + 1,
        };
        let id = self.alloc_state(clone);
        self.state_layers[layer + 1].nodes.push(id);
        self.rules[rule.index()].requires.push(id);
        self.state_mut(source).producer = Some(rule);
        id
    }

    /// Drop every layer behind state layer `layer`; its nodes lose their producers.
    pub fn truncate_behind(&mut self, layer: usize) {
        self.state_layers.truncate(layer + 1);
        self.rule_layers.truncate(layer);
        let keep_states = self.states.partition_point(|node| node.layer <= layer);
        self.states.truncate(keep_states);
        let keep_rules = self.rules.partition_point(|node| node.layer < layer);
        self.rules.truncate(keep_rules);
        for id in self.state_layers[layer].nodes.clone() {
            self.state_mut(id).producer = None;
        }
    }

    /// Walk forward from `node` through passthroughs to the first concrete rule
    /// node consuming it. `None` for goals and their carried clones.
    pub fn nearest_concrete_ancestor(&self, node: StateNodeId) -> Option<Ancestor> {
        let mut current = node;
        loop {
            let consumer = self.state(current).consumer?;
            let rule = self.rule(consumer);
            let produced = *rule.produces.first()?;
            match rule.kind {
                RuleNodeKind::Concrete(_) => {
                    return Some(Ancestor {
                        rule: consumer,
                        produced,
                        link: current,
                    })
                }
                RuleNodeKind::Passthrough => current = produced,
            }
        }
    }

    /// `node` and every state it feeds on the way to its goal.
    pub fn forward_chain(&self, node: StateNodeId) -> Vec<StateNodeId> {
        let mut chain = vec![node];
        let mut current = node;
        while let Some(consumer) = self.state(current).consumer {
            match self.rule(consumer).produces.first() {
                Some(&produced) => {
                    chain.push(produced);
                    current = produced;
                }
                None => break,
            }
        }
        chain
    }

    /// Concrete rule nodes from the backmost layer to the goal layer, in
    /// creation order within a layer.
    pub fn concrete_rules_backward(&self) -> Vec<RuleNodeId> {
        self.rule_layers
            .iter()
            .rev()
            .flat_map(|layer| layer.nodes.iter().copied())
            .filter(|id| self.rule(*id).grounding().is_some())
            .collect()
    }
}
