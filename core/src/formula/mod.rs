//! Formula engine for special-survey typologies.
//!
//! Formulas combine captured measurements (uppercase variable names such as
//! `L` or `HB`) with decimal literals.
//!
//! # Supported Grammar
//!
//! ```text
//! expression := term (('+' | '-') term)*
//! term       := factor (('*' | '/') factor)*
//! factor     := NUMBER | VARNAME | '(' expression ')' | ('+' | '-') factor
//! ```
//!
//! # Example
//!
//! ```
//! use metro_core::formula::evaluate;
//!
//! let vars = |name: &str| match name {
//!     "L" => Some(10.0),
//!     _ => None,
//! };
//! let result = evaluate("(L+6)/2", &vars).expect("Should compute");
//! assert!((result - 8.0).abs() < f32::EPSILON);
//! ```

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use evaluator::{VariableLookup, VariableProvider};
pub use parser::parse;

use tracing::debug;

use crate::error::FormulaError;

/// Sample values used by [`validate`]: width, height, and two small offsets.
const SAMPLE_VARIABLES: [(&str, f32); 4] = [("L", 1000.0), ("H", 1000.0), ("B", 50.0), ("S", 20.0)];

/// Parse and evaluate a formula against the given variables.
pub fn evaluate<V: VariableProvider + ?Sized>(formula: &str, vars: &V) -> Result<f32, FormulaError> {
    let ast = parse(formula)?;
    evaluator::evaluate(&ast, vars)
}

/// Check that a formula evaluates against a representative measured set.
///
/// Only `L`, `H`, `B` and `S` are known here, so a formula naming any other
/// variable is reported invalid.
pub fn validate(formula: &str) -> bool {
    let sample = |name: &str| {
        SAMPLE_VARIABLES
            .iter()
            .find(|(sample_name, _)| *sample_name == name)
            .map(|(_, value)| *value)
    };

    match evaluate(formula, &sample) {
        Ok(_) => true,
        Err(e) => {
            debug!(formula, error = %e, "Formula failed validation");
            false
        }
    }
}

/// Parse a formula and check that every variable it names is in `declared`.
pub fn check_declared(formula: &str, declared: &[&str]) -> Result<(), FormulaError> {
    let ast = parse(formula)?;
    match ast.variables().into_iter().find(|name| !declared.contains(name)) {
        Some(missing) => Err(FormulaError::UndeclaredVariable(missing.to_string())),
        None => Ok(()),
    }
}

/// Variable names referenced by a formula, in first-use order.
pub fn referenced_variables(formula: &str) -> Result<Vec<String>, FormulaError> {
    let ast = parse(formula)?;
    Ok(ast.variables().into_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars(_: &str) -> Option<f32> {
        None
    }

    #[test]
    fn test_evaluate_precedence() {
        let result = evaluate("3+4*2", &no_vars).unwrap();
        assert!((result - 11.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_evaluate_with_variable() {
        let vars = |name: &str| (name == "L").then_some(10.0);
        let result = evaluate("(L+6)/2", &vars).unwrap();
        assert!((result - 8.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_evaluate_division_by_zero() {
        let vars = |name: &str| (name == "L").then_some(10.0);
        assert_eq!(evaluate("L/0", &vars), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_evaluate_missing_variable() {
        let vars = |name: &str| (name == "L").then_some(10.0);
        let err = evaluate("L+H", &vars).unwrap_err();
        assert_eq!(err, FormulaError::UndeclaredVariable("H".to_string()));
        assert_eq!(err.variable(), Some("H"));
    }

    #[test]
    fn test_evaluate_unterminated() {
        assert!(matches!(
            evaluate("(3+4", &no_vars),
            Err(FormulaError::UnterminatedParenthesis { .. })
        ));
    }

    #[test]
    fn test_parse_error_reported_before_variables() {
        assert!(matches!(
            evaluate("X + (", &no_vars),
            Err(FormulaError::UnexpectedEnd)
        ));
    }

    #[test]
    fn test_validate() {
        assert!(validate("L - 2*B"));
        assert!(validate("(H - S) / 2"));
        assert!(validate("42"));

        assert!(!validate(""));
        assert!(!validate("L +"));
        assert!(!validate("((1 + 2)"));
        assert!(!validate("L / (B - 50)"));
        assert!(!validate("Q + 1"));
    }

    #[test]
    fn test_deeply_nested_formula_is_rejected() {
        let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(
            evaluate(&nested, &no_vars),
            Err(FormulaError::TooDeeplyNested { .. })
        ));
        assert!(!validate(&format!("{}L", "-".repeat(10_000))));
    }

    #[test]
    fn test_check_declared() {
        assert!(check_declared("L + H", &["L", "H"]).is_ok());
        assert_eq!(
            check_declared("L + Z", &["L", "H"]),
            Err(FormulaError::UndeclaredVariable("Z".to_string()))
        );
        assert!(matches!(
            check_declared("L +", &["L"]),
            Err(FormulaError::UnexpectedEnd)
        ));
    }

    #[test]
    fn test_referenced_variables() {
        assert_eq!(
            referenced_variables("(L + HB) / 2 - L").unwrap(),
            vec!["L".to_string(), "HB".to_string()]
        );
    }
}
