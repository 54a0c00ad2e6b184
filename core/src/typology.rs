//! Special-survey typologies.
//!
//! A typology declares the measurements to capture (variables such as `L`
//! and `H`) and the cut elements derived from them by formula. A survey
//! captures the variables in declaration order, then computes every element.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TypologyError;
use crate::formula::{self, VariableLookup, VariableProvider};

pub const MAX_VARIABLES: usize = 8;
pub const MAX_ELEMENTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct FormulaVariable {
    pub name: String,
    pub description: String,
    pub value: f32,
    pub measured: bool,
    pub required: bool,
}

impl FormulaVariable {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value: 0.0,
            measured: false,
            required: true,
        }
    }

    pub fn measured(name: impl Into<String>, value: f32) -> Self {
        Self {
            value,
            measured: true,
            ..Self::new(name, "")
        }
    }
}

/// Variable provider over a slice of captured variables.
#[derive(Debug, Clone, Copy)]
pub struct Variables<'a>(pub &'a [FormulaVariable]);

impl VariableProvider for Variables<'_> {
    fn lookup(&self, name: &str) -> VariableLookup {
        match self.0.iter().find(|v| v.name == name) {
            Some(v) if v.measured => VariableLookup::Value(v.value),
            Some(_) => VariableLookup::Unmeasured,
            None => VariableLookup::Undeclared,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedElement {
    pub name: String,
    pub formula: String,
    pub default_quantity: u32,
    pub quantity: u32,
    /// Last computed length; `None` until computed or after a failure.
    pub result: Option<f32>,
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Typology {
    name: String,
    variables: Vec<FormulaVariable>,
    elements: Vec<ComputedElement>,
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase())
}

impl Typology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[FormulaVariable] {
        &self.variables
    }

    pub fn elements(&self) -> &[ComputedElement] {
        &self.elements
    }

    pub fn add_variable(&mut self, variable: FormulaVariable) -> Result<(), TypologyError> {
        if self.variables.len() >= MAX_VARIABLES {
            return Err(TypologyError::TooManyVariables {
                limit: MAX_VARIABLES,
            });
        }
        if !is_valid_name(&variable.name) {
            return Err(TypologyError::InvalidVariableName(variable.name));
        }
        if self.variables.iter().any(|v| v.name == variable.name) {
            return Err(TypologyError::DuplicateVariable(variable.name));
        }
        self.variables.push(variable);
        Ok(())
    }

    /// Add an element whose formula may only name declared variables.
    pub fn add_element(
        &mut self,
        name: impl Into<String>,
        formula: impl Into<String>,
        default_quantity: u32,
    ) -> Result<(), TypologyError> {
        let name = name.into();
        let formula = formula.into();

        if self.elements.len() >= MAX_ELEMENTS {
            return Err(TypologyError::TooManyElements {
                limit: MAX_ELEMENTS,
            });
        }

        let declared: Vec<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        formula::check_declared(&formula, &declared).map_err(|source| TypologyError::Formula {
            element: name.clone(),
            source,
        })?;

        self.elements.push(ComputedElement {
            name,
            formula,
            default_quantity,
            quantity: default_quantity,
            result: None,
            sent: false,
        });
        Ok(())
    }

    pub fn next_unmeasured(&self) -> Option<&FormulaVariable> {
        self.variables.iter().find(|v| !v.measured)
    }

    /// Store `value` in the first variable not yet measured.
    pub fn capture_next(&mut self, value: f32) -> Option<&FormulaVariable> {
        let variable = self.variables.iter_mut().find(|v| !v.measured)?;
        variable.value = value;
        variable.measured = true;
        debug!(variable = %variable.name, value, "Survey variable captured");
        Some(&*variable)
    }

    /// Overwrite a specific variable, e.g. when the operator re-measures it.
    pub fn set_variable(&mut self, name: &str, value: f32) -> Result<(), TypologyError> {
        let variable = self
            .variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| TypologyError::UnknownVariable(name.to_string()))?;
        variable.value = value;
        variable.measured = true;
        Ok(())
    }

    /// True once every required variable has been measured.
    pub fn is_complete(&self) -> bool {
        self.variables.iter().all(|v| v.measured || !v.required)
    }

    /// Evaluate one element against the captured variables.
    pub fn evaluate_element(&self, index: usize) -> Result<f32, TypologyError> {
        let element = self
            .elements
            .get(index)
            .ok_or(TypologyError::UnknownElement(index))?;
        formula::evaluate(&element.formula, &Variables(&self.variables)).map_err(|source| {
            TypologyError::Formula {
                element: element.name.clone(),
                source,
            }
        })
    }

    /// Compute every element, storing each result. Elements that fail keep
    /// no result; the first failure is returned.
    pub fn compute_elements(&mut self) -> Result<(), TypologyError> {
        let outcomes: Vec<Result<f32, TypologyError>> = (0..self.elements.len())
            .map(|i| self.evaluate_element(i))
            .collect();

        let mut first_error = None;
        for (element, outcome) in self.elements.iter_mut().zip(outcomes) {
            match outcome {
                Ok(value) => element.result = Some(value),
                Err(e) => {
                    warn!(typology = %self.name, error = %e, "Element computation failed");
                    element.result = None;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(typology = %self.name, elements = self.elements.len(), "Elements computed");
                Ok(())
            }
        }
    }

    pub fn set_quantity(&mut self, index: usize, quantity: u32) -> Result<(), TypologyError> {
        let element = self
            .elements
            .get_mut(index)
            .ok_or(TypologyError::UnknownElement(index))?;
        element.quantity = quantity;
        Ok(())
    }

    pub fn mark_sent(&mut self, index: usize) -> Result<(), TypologyError> {
        let element = self
            .elements
            .get_mut(index)
            .ok_or(TypologyError::UnknownElement(index))?;
        element.sent = true;
        Ok(())
    }

    /// Elements with a result and a nonzero quantity that were not sent yet.
    pub fn pending_elements(&self) -> impl Iterator<Item = (usize, &ComputedElement)> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.result.is_some() && e.quantity > 0 && !e.sent)
    }

    /// Clear captured values and results to start a new survey.
    pub fn reset(&mut self) {
        for variable in &mut self.variables {
            variable.value = 0.0;
            variable.measured = false;
        }
        for element in &mut self.elements {
            element.result = None;
            element.quantity = element.default_quantity;
            element.sent = false;
        }
        debug!(typology = %self.name, "Survey reset");
    }
}
