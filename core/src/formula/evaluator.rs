use crate::error::FormulaError;
use crate::formula::ast::{BinaryOp, Expr, UnaryOp};

/// Outcome of looking up a variable by name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariableLookup {
    /// Declared and captured.
    Value(f32),
    /// Declared but not captured yet.
    Unmeasured,
    /// Not part of the variable set at all.
    Undeclared,
}

/// Trait for providing variable values during evaluation.
pub trait VariableProvider {
    fn lookup(&self, name: &str) -> VariableLookup;
}

impl<F> VariableProvider for F
where
    F: Fn(&str) -> Option<f32>,
{
    fn lookup(&self, name: &str) -> VariableLookup {
        match self(name) {
            Some(value) => VariableLookup::Value(value),
            None => VariableLookup::Undeclared,
        }
    }
}

/// Evaluate an expression with the given variable provider.
///
/// Evaluation is left to right, so the first failing sub-expression decides the error.
pub fn evaluate<V: VariableProvider + ?Sized>(expr: &Expr, vars: &V) -> Result<f32, FormulaError> {
    match expr {
        Expr::Number(n) => finite(*n),
        Expr::Variable(name) => match vars.lookup(name) {
            VariableLookup::Value(value) => finite(value),
            VariableLookup::Unmeasured => Err(FormulaError::UnmeasuredVariable(name.clone())),
            VariableLookup::Undeclared => Err(FormulaError::UndeclaredVariable(name.clone())),
        },
        Expr::Binary { op, left, right } => {
            let left_val = evaluate(left, vars)?;
            let right_val = evaluate(right, vars)?;
            evaluate_binary(*op, left_val, right_val)
        }
        Expr::Unary { op, expr } => {
            let val = evaluate(expr, vars)?;
            Ok(evaluate_unary(*op, val))
        }
    }
}

fn finite(value: f32) -> Result<f32, FormulaError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::NonFinite)
    }
}

fn evaluate_binary(op: BinaryOp, l: f32, r: f32) -> Result<f32, FormulaError> {
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            l / r
        }
    };
    finite(result)
}

fn evaluate_unary(op: UnaryOp, val: f32) -> f32 {
    match op {
        UnaryOp::Plus => val,
        UnaryOp::Neg => -val,
    }
}
