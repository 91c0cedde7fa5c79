//! Index calculator
//!
//! Built-in HPI, HEI and Cd formulas plus the interpreter for validated
//! custom-formula trees. Every function here is pure over its inputs.

use chrono::{DateTime, Utc};

use crate::catalog::IndexDefinition;
use crate::error::ComputationError;
use crate::formula::{BinaryOp, Binding, Expr, SumRange};
use crate::models::{IndexKind, IndexResult, IndexValue, Sample};
use crate::parameters::ParameterRegistry;
use crate::standards::Standard;

/// Default unit-weight constant `k` in `Wi = k / Si`
pub const DEFAULT_WEIGHT_CONSTANT: f64 = 1.0;

/// Mi, Ii and Si of one parameter for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterTerms<'a> {
    pub name: &'a str,
    pub measured: f64,
    pub ideal: f64,
    pub limit: f64,
}

impl ParameterTerms<'_> {
    /// `Qi = (Mi - Ii) / (Si - Ii) * 100`
    pub fn quality_rating(&self) -> Result<f64, ComputationError> {
        if self.limit == self.ideal {
            return Err(ComputationError::DegenerateRange(self.name.to_string()));
        }
        Ok((self.measured - self.ideal) / (self.limit - self.ideal) * 100.0)
    }

    /// `Mi / Si`
    pub fn limit_ratio(&self) -> Result<f64, ComputationError> {
        if self.limit == 0.0 {
            return Err(ComputationError::DivisionByZero(format!("{} / Si", self.name)));
        }
        Ok(self.measured / self.limit)
    }
}

/// Evaluates index definitions against samples under one standard
#[derive(Debug, Clone, Copy)]
pub struct IndexCalculator<'a> {
    registry: &'a ParameterRegistry,
    standard: &'a Standard,
    weight_constant: f64,
}

impl<'a> IndexCalculator<'a> {
    pub fn new(registry: &'a ParameterRegistry, standard: &'a Standard) -> Self {
        Self {
            registry,
            standard,
            weight_constant: DEFAULT_WEIGHT_CONSTANT,
        }
    }

    pub fn with_weight_constant(mut self, k: f64) -> Self {
        self.weight_constant = k;
        self
    }

    pub fn standard(&self) -> &Standard {
        self.standard
    }

    /// Gather Mi, Ii and Si for `parameter`
    pub fn terms<'p>(&self, parameter: &'p str, sample: &Sample) -> Result<ParameterTerms<'p>, ComputationError> {
        let measured = sample
            .measured(parameter)
            .ok_or_else(|| ComputationError::MissingParameter(parameter.to_string()))?;
        let limit = self.standard.limit(parameter).ok_or_else(|| {
            ComputationError::MissingParameter(format!(
                "{} (no limit in standard {})",
                parameter, self.standard.id
            ))
        })?;
        let ideal = self
            .standard
            .ideal_override(parameter)
            .unwrap_or_else(|| self.registry.ideal_value(parameter));

        Ok(ParameterTerms {
            name: parameter,
            measured,
            ideal,
            limit,
        })
    }

    /// `Wi = k / Si`
    fn unit_weight(&self, terms: &ParameterTerms<'_>) -> Result<f64, ComputationError> {
        if terms.limit == 0.0 {
            return Err(ComputationError::DivisionByZero(format!("W({}) = k / Si", terms.name)));
        }
        Ok(self.weight_constant / terms.limit)
    }

    /// `HPI = Σ(Wi·Qi) / Σ(Wi)`
    pub fn hpi(&self, parameters: &[String], sample: &Sample) -> Result<f64, ComputationError> {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for parameter in parameters {
            let terms = self.terms(parameter, sample)?;
            let weight = self.unit_weight(&terms)?;
            weighted += weight * terms.quality_rating()?;
            total_weight += weight;
        }
        if total_weight == 0.0 {
            return Err(ComputationError::DivisionByZero("HPI: sum of weights".to_string()));
        }
        Ok(weighted / total_weight)
    }

    /// `HEI = Σ(Mi / Si)`
    pub fn hei(&self, parameters: &[String], sample: &Sample) -> Result<f64, ComputationError> {
        parameters.iter().try_fold(0.0, |acc, parameter| -> Result<f64, ComputationError> {
            Ok(acc + self.terms(parameter, sample)?.limit_ratio()?)
        })
    }

    /// `Cd = Σ(Mi / Si - 1)`; negative contributions are kept
    pub fn cd(&self, parameters: &[String], sample: &Sample) -> Result<f64, ComputationError> {
        parameters.iter().try_fold(0.0, |acc, parameter| -> Result<f64, ComputationError> {
            Ok(acc + self.terms(parameter, sample)?.limit_ratio()? - 1.0)
        })
    }

    /// Compute `definition` on `sample`
    pub fn compute(&self, definition: &IndexDefinition, sample: &Sample) -> Result<f64, ComputationError> {
        let value = match definition.kind {
            IndexKind::Hpi => self.hpi(&definition.parameters, sample)?,
            IndexKind::Hei => self.hei(&definition.parameters, sample)?,
            IndexKind::Cd => self.cd(&definition.parameters, sample)?,
            IndexKind::Custom => {
                let expr = definition
                    .formula()
                    .ok_or_else(|| ComputationError::UnvalidatedDefinition(definition.name.clone()))?;
                let evaluator = Evaluator {
                    calculator: self,
                    definition,
                    sample,
                };
                evaluator.eval(expr, None)?
            }
        };

        if !value.is_finite() {
            return Err(ComputationError::NonFiniteResult);
        }
        Ok(value)
    }

    /// Compute and classify `definition` on `sample`
    pub fn index_result(
        &self,
        definition: &IndexDefinition,
        sample: &Sample,
        computed_at: DateTime<Utc>,
    ) -> IndexResult {
        let value = IndexValue::from(self.compute(definition, sample));
        let band = value
            .as_value()
            .and_then(|v| definition.classify(v))
            .cloned();

        IndexResult {
            sample_id: sample.id.clone(),
            index_name: definition.name.clone(),
            value,
            band,
            computed_at,
        }
    }
}

/// Tree interpreter for one (definition, sample) pair
struct Evaluator<'c, 'a> {
    calculator: &'c IndexCalculator<'a>,
    definition: &'c IndexDefinition,
    sample: &'c Sample,
}

impl Evaluator<'_, '_> {
    fn eval(&self, expr: &Expr, scope: Option<&ParameterTerms<'_>>) -> Result<f64, ComputationError> {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::Parameter(name) => self
                .sample
                .measured(name)
                .ok_or_else(|| ComputationError::MissingParameter(name.clone())),
            Expr::Bound(binding) => {
                let terms = scope
                    .ok_or_else(|| ComputationError::MissingParameter(binding.symbol().to_string()))?;
                self.bound(*binding, terms)
            }
            Expr::Neg(inner) => Ok(-self.eval(inner, scope)?),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs, scope)?;
                let r = self.eval(rhs, scope)?;
                match op {
                    BinaryOp::Add => Ok(l + r),
                    BinaryOp::Sub => Ok(l - r),
                    BinaryOp::Mul => Ok(l * r),
                    BinaryOp::Div if r == 0.0 => Err(ComputationError::DivisionByZero(match scope {
                        Some(terms) => format!("{} (for {})", rhs, terms.name),
                        None => rhs.to_string(),
                    })),
                    BinaryOp::Div => Ok(l / r),
                }
            }
            Expr::Sum { body, range } => {
                let names: &[String] = match range {
                    SumRange::List(names) => names,
                    SumRange::Definition => &self.definition.parameters,
                };
                let mut total = 0.0;
                for name in names {
                    let terms = self.calculator.terms(name, self.sample)?;
                    total += self.eval(body, Some(&terms))?;
                }
                Ok(total)
            }
        }
    }

    fn bound(&self, binding: Binding, terms: &ParameterTerms<'_>) -> Result<f64, ComputationError> {
        match binding {
            Binding::Measured => Ok(terms.measured),
            Binding::Ideal => Ok(terms.ideal),
            Binding::Limit => Ok(terms.limit),
            Binding::Quality => terms.quality_rating(),
            Binding::Weight => self
                .definition
                .weight(terms.name)
                .ok_or_else(|| ComputationError::MissingParameter(format!("weight of {}", terms.name))),
        }
    }
}
