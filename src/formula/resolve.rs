//! Post-parse validation: every symbol must resolve against the parameter
//! registry, the chosen standard and the owning definition.

use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::formula::ast::{Binding, Expr, SumRange};
use crate::parameters::ParameterRegistry;
use crate::standards::Standard;

/// What a formula may refer to
pub struct ResolveContext<'a> {
    pub registry: &'a ParameterRegistry,
    pub standard: &'a Standard,
    /// The definition's declared parameter list
    pub parameters: &'a [String],
    pub weights: Option<&'a BTreeMap<String, f64>>,
}

impl ResolveContext<'_> {
    fn check_parameter(&self, name: &str) -> Result<(), ValidationError> {
        if !self.registry.contains(name) {
            return Err(ValidationError::UnknownParameter(name.to_string()));
        }
        if !self.standard.covers(name) {
            return Err(ValidationError::UnknownParameter(format!(
                "{} (no limit in standard {})",
                name, self.standard.id
            )));
        }
        if !self.parameters.iter().any(|p| p == name) {
            return Err(ValidationError::UnknownParameter(format!(
                "{} (not in the index parameter list)",
                name
            )));
        }
        Ok(())
    }
}

/// Check every symbol in `expr`
pub fn resolve(expr: &Expr, ctx: &ResolveContext<'_>) -> Result<(), ValidationError> {
    walk(expr, ctx, false)
}

fn walk(expr: &Expr, ctx: &ResolveContext<'_>, in_sum: bool) -> Result<(), ValidationError> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Parameter(name) => ctx.check_parameter(name),
        Expr::Bound(binding) if !in_sum => Err(ValidationError::UnknownParameter(format!(
            "{} (only bound inside sum)",
            binding.symbol()
        ))),
        Expr::Bound(_) => Ok(()),
        Expr::Neg(inner) => walk(inner, ctx, in_sum),
        Expr::Binary { lhs, rhs, .. } => {
            walk(lhs, ctx, in_sum)?;
            walk(rhs, ctx, in_sum)
        }
        Expr::Sum { body, range } => {
            let names: &[String] = match range {
                SumRange::List(names) => names,
                SumRange::Definition => ctx.parameters,
            };
            for name in names {
                ctx.check_parameter(name)?;
            }
            if body.uses_binding(Binding::Weight) {
                check_weights(names, ctx.weights)?;
            }
            walk(body, ctx, true)
        }
    }
}

fn check_weights(
    names: &[String],
    weights: Option<&BTreeMap<String, f64>>,
) -> Result<(), ValidationError> {
    let weights = weights.ok_or_else(|| {
        ValidationError::MalformedWeights("formula uses Wi but no weights were given".to_string())
    })?;
    for name in names {
        if !weights.contains_key(name) {
            return Err(ValidationError::MalformedWeights(format!(
                "formula uses Wi but {} has no weight",
                name
            )));
        }
    }
    Ok(())
}
