//! State templates: named, typed, owner-parameterized conditions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use ai_core::{FactKey, Value, ValueType, WorldState};

use crate::error::{PlanError, Result};

/// Variable name to concrete value.
pub type Bindings = BTreeMap<String, Value>;

/// Live query evaluated against the planning snapshot.
///
/// Receives the state's grounded owners. `None` means the inquiry cannot
/// answer for those owners, which aborts the session.
pub type Inquiry = Arc<dyn Fn(&WorldState, &[Value]) -> Option<Value> + Send + Sync>;

/// A named placeholder of a given value type, bound during grounding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable {
    pub name: String,
    pub value_type: ValueType,
}

impl Variable {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Entity)
    }

    pub fn vector(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Vector)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Boolean)
    }

    pub fn is_numeric(&self) -> bool {
        self.value_type == ValueType::Number
    }
}

/// Either a concrete value or a variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Value(Value),
    Var(Variable),
}

impl Term {
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Term::Var(var) => Some(var),
            Term::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Term::Value(value) => Some(value),
            Term::Var(_) => None,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// The concrete value, looking variables up in `bindings`.
    pub fn resolve(&self, bindings: &Bindings) -> Option<Value> {
        match self {
            Term::Value(value) => Some(value.clone()),
            Term::Var(var) => bindings.get(&var.name).cloned(),
        }
    }

    /// Replace a bound variable with its value; unbound variables stay.
    pub fn ground(&self, bindings: &Bindings) -> Term {
        match self.resolve(bindings) {
            Some(value) => Term::Value(value),
            None => self.clone(),
        }
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::Value(value)
    }
}

impl From<Variable> for Term {
    fn from(var: Variable) -> Self {
        Term::Var(var)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Term::Value(Value::Boolean(value))
    }
}

impl From<f64> for Term {
    fn from(value: f64) -> Self {
        Term::Value(Value::Number(value))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Value(value) => write!(f, "{value}"),
            Term::Var(var) => write!(f, "?{}", var.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
}

impl Comparison {
    /// Whether `value` stands in this relation to `target`.
    ///
    /// Ordering comparisons only hold between numbers.
    pub fn holds(self, value: &Value, target: &Value) -> bool {
        match self {
            Comparison::Equal => value == target,
            Comparison::NotEqual => value != target,
            Comparison::LessThan => match (value.as_number(), target.as_number()) {
                (Some(v), Some(t)) => v < t,
                _ => false,
            },
            Comparison::GreaterThan => match (value.as_number(), target.as_number()) {
                (Some(v), Some(t)) => v > t,
                _ => false,
            },
        }
    }

    /// Degree of satisfaction in `[0, 1]`; 1 exactly when the relation holds.
    ///
    /// Unsatisfied numeric comparisons score by relative distance to the target,
    /// everything else unsatisfied scores 0.
    pub fn degree(self, value: &Value, target: &Value) -> f64 {
        if self.holds(value, target) {
            return 1.0;
        }
        match (self, value.as_number(), target.as_number()) {
            (Comparison::LessThan | Comparison::GreaterThan, Some(v), Some(t)) => {
                let gap = (v - t).abs() / t.abs().max(1.0);
                (1.0 - gap).clamp(0.0, 0.999)
            }
            _ => 0.0,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::LessThan => "<",
            Comparison::GreaterThan => ">",
        }
    }
}

/// A condition over one fact: `name(owners) <comparison> target`.
///
/// Owners and target may contain variables; a template with concrete owners is
/// grounded and can be evaluated. A template flagged as requiring inquiry must
/// carry an [`Inquiry`] (checked by [`StateTemplate::validate`]).
#[derive(Clone)]
pub struct StateTemplate {
    name: String,
    value_type: ValueType,
    comparison: Comparison,
    target: Term,
    owners: Vec<Term>,
    inquiry: Option<Inquiry>,
    requires_inquiry: bool,
}

impl StateTemplate {
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        comparison: Comparison,
        target: impl Into<Term>,
        owners: Vec<Term>,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            comparison,
            target: target.into(),
            owners,
            inquiry: None,
            requires_inquiry: false,
        }
    }

    /// Shorthand for a boolean `name(owners) == value` condition.
    pub fn flag(name: impl Into<String>, owners: Vec<Term>, value: bool) -> Self {
        Self::new(name, ValueType::Boolean, Comparison::Equal, value, owners)
    }

    /// Attach a live inquiry; the state is then always answered by it.
    pub fn with_inquiry<F>(mut self, inquiry: F) -> Self
    where
        F: Fn(&WorldState, &[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        self.inquiry = Some(Arc::new(inquiry));
        self.requires_inquiry = true;
        self
    }

    pub fn requires_inquiry_flag(mut self, requires: bool) -> Self {
        self.requires_inquiry = requires;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn target(&self) -> &Term {
        &self.target
    }

    pub fn owners(&self) -> &[Term] {
        &self.owners
    }

    pub fn inquiry(&self) -> Option<&Inquiry> {
        self.inquiry.as_ref()
    }

    pub fn requires_inquiry(&self) -> bool {
        self.requires_inquiry
    }

    pub fn validate(&self) -> Result<()> {
        if self.requires_inquiry && self.inquiry.is_none() {
            return Err(PlanError::MissingInquiry {
                state: self.to_string(),
            });
        }
        Ok(())
    }

    /// Owners are all concrete.
    pub fn is_ground(&self) -> bool {
        self.owners.iter().all(|owner| !owner.is_var())
    }

    pub fn ground(&self, bindings: &Bindings) -> StateTemplate {
        let mut grounded = self.clone();
        grounded.owners = self.owners.iter().map(|o| o.ground(bindings)).collect();
        grounded.target = self.target.ground(bindings);
        grounded
    }

    pub fn with_owners(&self, owners: Vec<Term>) -> StateTemplate {
        let mut out = self.clone();
        out.owners = owners;
        out
    }

    /// Fact identity, once owners are concrete.
    pub fn key(&self) -> Option<FactKey> {
        let owners = self
            .owners
            .iter()
            .map(|owner| owner.as_value().cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(FactKey::new(self.name.clone(), owners))
    }

    /// Same predicate over the same owners.
    pub fn same_fact(&self, other: &StateTemplate) -> bool {
        self.name == other.name && self.owners == other.owners
    }

    /// Same fact, same comparison, same target.
    pub fn same_condition(&self, other: &StateTemplate) -> bool {
        self.same_fact(other)
            && self.comparison == other.comparison
            && self.target == other.target
    }

    /// Variables appearing as owners, in order of first appearance.
    pub fn owner_variables(&self) -> Vec<&Variable> {
        let mut seen = BTreeSet::new();
        self.owners
            .iter()
            .filter_map(Term::as_var)
            .filter(|var| seen.insert(&var.name))
            .collect()
    }

    /// Whether `value` satisfies this condition. An unbound target accepts anything.
    pub fn accepts(&self, value: &Value) -> bool {
        match &self.target {
            Term::Var(_) => true,
            Term::Value(target) => self.comparison.holds(value, target),
        }
    }
}

impl fmt::Debug for StateTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTemplate")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("comparison", &self.comparison)
            .field("target", &self.target)
            .field("owners", &self.owners)
            .field("inquiry", &self.inquiry.as_ref().map(|_| "<fn>"))
            .field("requires_inquiry", &self.requires_inquiry)
            .finish()
    }
}

impl fmt::Display for StateTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, owner) in self.owners.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{owner}")?;
        }
        write!(f, ") {} {}", self.comparison.symbol(), self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(food: Term) -> StateTemplate {
        StateTemplate::new(
            "holder",
            ValueType::Entity,
            Comparison::Equal,
            Value::entity("avatar"),
            vec![food],
        )
    }

    #[test]
    fn equality_ignores_the_sign_of_zero() {
        let recorded = Value::Number(0.0);
        assert!(Comparison::Equal.holds(&recorded, &Value::Number(-0.0)));
        assert!(!Comparison::NotEqual.holds(&recorded, &Value::Number(-0.0)));
    }

    #[test]
    fn ground_replaces_bound_variables_only() {
        let template = StateTemplate::new(
            "is_below",
            ValueType::Boolean,
            Comparison::Equal,
            true,
            vec![
                Term::Var(Variable::vector("pos")),
                Term::Var(Variable::vector("pos_on")),
            ],
        );
        let mut bindings = Bindings::new();
        bindings.insert("pos".into(), Value::vector(1.0, 0.0, 0.0));

        let partial = template.ground(&bindings);
        assert!(!partial.is_ground());
        assert_eq!(partial.owners()[0], Term::Value(Value::vector(1.0, 0.0, 0.0)));
        assert!(partial.key().is_none());

        bindings.insert("pos_on".into(), Value::vector(1.0, -1.0, 0.0));
        let full = template.ground(&bindings);
        assert!(full.is_ground());
        assert_eq!(full.key().expect("ground").owners.len(), 2);
    }

    #[test]
    fn validate_rejects_inquiry_flag_without_callback() {
        let state = holder(Value::entity("apple").into()).requires_inquiry_flag(true);
        assert!(matches!(
            state.validate(),
            Err(PlanError::MissingInquiry { .. })
        ));

        let state = holder(Value::entity("apple").into()).with_inquiry(|_, _| None);
        assert!(state.validate().is_ok());
        assert!(state.requires_inquiry());
    }

    #[test]
    fn same_condition_requires_matching_target() {
        let a = holder(Value::entity("apple").into());
        let b = a.with_owners(vec![Value::entity("apple").into()]);
        assert!(a.same_condition(&b));

        let c = StateTemplate::new(
            "holder",
            ValueType::Entity,
            Comparison::Equal,
            Value::entity("none"),
            vec![Value::entity("apple").into()],
        );
        assert!(a.same_fact(&c));
        assert!(!a.same_condition(&c));
    }

    #[test]
    fn numeric_degree_is_partial_below_threshold() {
        let target = Value::Number(0.8);
        assert_eq!(Comparison::GreaterThan.degree(&Value::Number(0.9), &target), 1.0);
        let partial = Comparison::GreaterThan.degree(&Value::Number(0.3), &target);
        assert!(partial > 0.0 && partial < 1.0);
        assert_eq!(
            Comparison::Equal.degree(&Value::entity("a"), &Value::entity("b")),
            0.0
        );
        assert!(!Comparison::LessThan.holds(&Value::entity("a"), &target));
    }

    #[test]
    fn display_reads_like_a_condition() {
        let state = holder(Term::Var(Variable::entity("food")));
        assert_eq!(state.to_string(), "holder(?food) == avatar");
    }
}
