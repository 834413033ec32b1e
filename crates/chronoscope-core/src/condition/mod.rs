//! Restricted boolean conditions evaluated against a step.
//!
//! An expression sees four bindings: `t` (the step's timestep), `state`
//! (its snapshot, read-only), `country(id)` and `avg(path)`. Evaluation
//! runs in three stages:
//!
//! 1. [`gate`] rejects disallowed characters and identifiers on the raw
//!    text. A rejected expression is never tokenized.
//! 2. [`lexer`] and [`parser`] build an [`Expr`] tree.
//! 3. The interpreter walks the tree against the step and coerces the
//!    result to a boolean by truthiness.
//!
//! Nothing here performs I/O or suspends. Compile once with
//! [`Condition::compile`] to replay an expression over many steps.

pub mod gate;
mod interp;
pub mod lexer;
pub mod parser;

use chronoscope_types::Step;

use crate::error::{EvaluationError, ValidationError};

pub use parser::Expr;

/// A validated and parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Gate, tokenize and parse an expression.
    ///
    /// # Errors
    ///
    /// [`EvaluationError::Rejected`] when the gate refuses the text,
    /// [`EvaluationError::Syntax`] when it does not parse.
    pub fn compile(expression: &str) -> Result<Self, EvaluationError> {
        gate::check(expression)?;
        let tokens = lexer::tokenize(expression)?;
        let expr = parser::parse(&tokens)?;
        Ok(Self {
            source: expression.to_owned(),
            expr,
        })
    }

    /// The expression text this condition was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed tree.
    pub const fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against one step.
    ///
    /// # Errors
    ///
    /// [`EvaluationError::Runtime`] on a fault such as reading a member of
    /// `null` or calling something that is not a function.
    pub fn evaluate(&self, step: &Step) -> Result<bool, EvaluationError> {
        interp::evaluate(&self.expr, step)
    }
}

/// Compile and evaluate in one call.
///
/// # Errors
///
/// See [`Condition::compile`] and [`Condition::evaluate`].
pub fn evaluate(expression: &str, step: &Step) -> Result<bool, EvaluationError> {
    Condition::compile(expression)?.evaluate(step)
}

/// Run only the validation gate, for authoring surfaces.
///
/// # Errors
///
/// Returns the [`ValidationError`] the gate raised.
pub fn validate(expression: &str) -> Result<(), ValidationError> {
    gate::check(expression)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use chronoscope_types::{EntityId, StateSnapshot};
    use serde_json::json;

    use super::*;

    fn step(timestep: u64, inflation: &[(&str, f64)]) -> Step {
        let entities: BTreeMap<EntityId, serde_json::Value> = inflation
            .iter()
            .map(|(id, value)| (EntityId::new(*id), json!({"macro": {"inflation": value}})))
            .collect();
        Step {
            timestep,
            state: StateSnapshot {
                entities,
                ..StateSnapshot::default()
            },
            audit: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn time_and_average_inflation() {
        let s = step(3, &[("FR", 0.03), ("DE", 0.04)]);
        assert!(evaluate("t > 2 && avg('macro.inflation') < 0.05", &s).unwrap());
        let early = step(2, &[("FR", 0.03), ("DE", 0.04)]);
        assert!(!evaluate("t > 2 && avg('macro.inflation') < 0.05", &early).unwrap());
    }

    #[test]
    fn host_object_is_rejected_before_evaluation() {
        let s = step(1, &[]);
        let err = evaluate("process.exit(1)", &s).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Rejected(ValidationError::ForbiddenIdentifier { .. })
        ));
        assert!(err.is_rejection());
        assert!(validate("process.exit(1)").is_err());
    }

    #[test]
    fn syntax_errors_are_rejections() {
        let err = Condition::compile("t >").unwrap_err();
        assert!(matches!(err, EvaluationError::Syntax { .. }));
        assert!(err.is_rejection());
        // The gate alone accepts it; only the parser objects.
        assert!(validate("t >").is_ok());
    }

    #[test]
    fn runtime_faults_are_not_rejections() {
        let s = step(1, &[]);
        let err = evaluate("state.entities.FR.macro", &s).unwrap_err();
        assert!(matches!(err, EvaluationError::Runtime { .. }));
        assert!(!err.is_rejection());
    }

    #[test]
    fn compiled_condition_replays_over_history() {
        let condition = Condition::compile("country('FR').macro.inflation >= 0.05").unwrap();
        assert_eq!(condition.source(), "country('FR').macro.inflation >= 0.05");
        let history: Vec<Step> = [0.01, 0.05, 0.07]
            .iter()
            .enumerate()
            .map(|(i, v)| step(u64::try_from(i).unwrap(), &[("FR", *v)]))
            .collect();
        let fired: Vec<bool> = history
            .iter()
            .map(|s| condition.evaluate(s).unwrap())
            .collect();
        assert_eq!(fired, vec![false, true, true]);
    }

    #[test]
    fn long_chains_fail_as_syntax_on_a_small_stack() {
        // Same stack size as a test thread or tokio worker.
        let outcome = std::thread::Builder::new()
            .stack_size(1 << 21)
            .spawn(|| {
                let s = step(1, &[("FR", 0.02)]);
                let sum = evaluate(&format!("t{}", "+t".repeat(1000)), &s);
                let members = evaluate(&format!("state{}", ".a".repeat(1000)), &s);
                (sum, members)
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(outcome.0, Err(EvaluationError::Syntax { .. })));
        assert!(matches!(outcome.1, Err(EvaluationError::Syntax { .. })));
    }

    #[test]
    fn missing_country_never_faults_on_lookup() {
        let s = step(1, &[]);
        assert!(evaluate("country('ZZ') != null", &s).unwrap());
    }
}
