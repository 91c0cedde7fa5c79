//! Index definition catalog
//!
//! Authoring state machine for index definitions:
//! Draft -> Validated -> Saved -> Deprecated.
//!
//! Every transition stores a fresh immutable snapshot; batches hold `Arc`s to
//! the snapshot they started with, so a definition is never edited in place.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{BandTable, ClassificationBand};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::formula::{self, Expr, ResolveContext};
use crate::models::{DefinitionState, IndexKind};
use crate::parameters::{ParameterRegistry, HEAVY_METALS};
use crate::standards::StandardTable;

/// An index the engine can compute
#[derive(Debug, Clone, Serialize)]
pub struct IndexDefinition {
    pub id: Uuid,
    pub name: String,
    pub kind: IndexKind,
    /// Author's formula text (custom kind only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula_text: Option<String>,
    /// Parsed tree, present once validated
    #[serde(skip)]
    formula: Option<Expr>,
    /// Ordered parameter symbols the index uses
    pub parameters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, f64>>,
    pub bands: BandTable,
    pub state: DefinitionState,
    /// Standard the formula was resolved against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_against: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexDefinition {
    /// A built-in index. Built-ins are fixed and start out Saved. A symbol
    /// listed twice is kept once.
    pub fn builtin(kind: IndexKind, parameters: &[&str], bands: BandTable) -> Self {
        let now = Utc::now();
        let mut seen = HashSet::new();
        Self {
            id: Uuid::new_v4(),
            name: kind.to_string(),
            kind,
            formula_text: None,
            formula: None,
            parameters: parameters
                .iter()
                .filter(|p| seen.insert(**p))
                .map(|p| p.to_string())
                .collect(),
            weights: None,
            bands,
            state: DefinitionState::Saved,
            validated_against: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn hpi(parameters: &[&str]) -> Self {
        Self::builtin(IndexKind::Hpi, parameters, BandTable::hpi_default())
    }

    pub fn hei(parameters: &[&str]) -> Self {
        Self::builtin(IndexKind::Hei, parameters, BandTable::hei_default())
    }

    pub fn cd(parameters: &[&str]) -> Self {
        Self::builtin(IndexKind::Cd, parameters, BandTable::cd_default())
    }

    /// Validated expression tree of a custom index
    pub fn formula(&self) -> Option<&Expr> {
        self.formula.as_ref()
    }

    pub fn weight(&self, parameter: &str) -> Option<f64> {
        self.weights.as_ref().and_then(|w| w.get(parameter).copied())
    }

    /// Band for `value` under this definition's table
    pub fn classify(&self, value: f64) -> Option<&ClassificationBand> {
        self.bands.classify(value)
    }

    fn transition(&self, to: DefinitionState) -> Self {
        let mut next = self.clone();
        next.state = to;
        next.updated_at = Utc::now();
        next
    }
}

fn check_unique(parameters: &[String]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    match parameters.iter().find(|p| !seen.insert(p.as_str())) {
        Some(duplicate) => Err(ValidationError::InvalidInput(format!(
            "parameter {} is listed more than once",
            duplicate
        ))),
        None => Ok(()),
    }
}

fn check_weights(
    parameters: &[String],
    weights: Option<&BTreeMap<String, f64>>,
) -> Result<(), ValidationError> {
    let Some(weights) = weights else {
        return Ok(());
    };
    for (name, weight) in weights {
        if !parameters.contains(name) {
            return Err(ValidationError::MalformedWeights(format!(
                "weight given for {}, which is not an index parameter",
                name
            )));
        }
        if !weight.is_finite() || *weight <= 0.0 {
            return Err(ValidationError::MalformedWeights(format!(
                "weight for {} must be a positive number, got {}",
                name, weight
            )));
        }
    }
    Ok(())
}

/// Catalog of index definitions
#[derive(Debug, Default)]
pub struct DefinitionCatalog {
    definitions: HashMap<Uuid, Arc<IndexDefinition>>,
    /// Creation order
    order: Vec<Uuid>,
}

impl DefinitionCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the built-in HPI, HEI and Cd over the heavy metals
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for definition in [
            IndexDefinition::hpi(HEAVY_METALS),
            IndexDefinition::hei(HEAVY_METALS),
            IndexDefinition::cd(HEAVY_METALS),
        ] {
            catalog.insert(definition);
        }
        info!(count = catalog.len(), "Seeded built-in index definitions");
        catalog
    }

    fn insert(&mut self, definition: IndexDefinition) -> Uuid {
        let id = definition.id;
        if !self.definitions.contains_key(&id) {
            self.order.push(id);
        }
        self.definitions.insert(id, Arc::new(definition));
        id
    }

    fn lookup(&self, id: Uuid) -> EngineResult<Arc<IndexDefinition>> {
        self.definitions
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("index definition {}", id)))
    }

    /// Register a new custom definition in Draft state.
    ///
    /// Bands are checked here; the formula and weights are checked by
    /// [`validate`](Self::validate).
    pub fn create_definition(
        &mut self,
        name: &str,
        formula_text: &str,
        parameters: Vec<String>,
        weights: Option<BTreeMap<String, f64>>,
        bands: Vec<ClassificationBand>,
    ) -> Result<Uuid, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::InvalidInput(
                "index name must not be empty".to_string(),
            ));
        }
        if self
            .definitions
            .values()
            .any(|d| d.name == name && d.state != DefinitionState::Deprecated)
        {
            return Err(ValidationError::InvalidInput(format!(
                "an active index named {} already exists",
                name
            )));
        }

        check_unique(&parameters)?;
        let bands = BandTable::new(bands)?;
        let now = Utc::now();
        let definition = IndexDefinition {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: IndexKind::Custom,
            formula_text: Some(formula_text.to_string()),
            formula: None,
            parameters,
            weights,
            bands,
            state: DefinitionState::Draft,
            validated_against: None,
            created_at: now,
            updated_at: now,
        };

        info!(definition_id = %definition.id, name = %definition.name, "Created draft index definition");
        Ok(self.insert(definition))
    }

    /// Parse and resolve a draft's formula against `standard_id`.
    ///
    /// On success the definition becomes Validated. A Validated definition may
    /// be validated again, e.g. against another standard.
    pub fn validate(
        &mut self,
        id: Uuid,
        registry: &ParameterRegistry,
        standards: &StandardTable,
        standard_id: &str,
    ) -> EngineResult<Arc<IndexDefinition>> {
        let current = self.lookup(id)?;
        if !matches!(current.state, DefinitionState::Draft | DefinitionState::Validated) {
            return Err(ValidationError::InvalidTransition {
                from: current.state,
                to: DefinitionState::Validated,
            }
            .into());
        }

        let standard = standards.get(standard_id)?;

        let result = (|| -> Result<Expr, ValidationError> {
            if current.parameters.is_empty() {
                return Err(ValidationError::EmptyParameterList);
            }
            check_unique(&current.parameters)?;
            for parameter in &current.parameters {
                if !registry.contains(parameter) {
                    return Err(ValidationError::UnknownParameter(parameter.clone()));
                }
            }
            check_weights(&current.parameters, current.weights.as_ref())?;

            let text = current.formula_text.as_deref().unwrap_or_default();
            let expr = formula::parse_formula(text)?;
            let ctx = ResolveContext {
                registry,
                standard,
                parameters: &current.parameters,
                weights: current.weights.as_ref(),
            };
            formula::resolve(&expr, &ctx)?;
            Ok(expr)
        })();

        let expr = match result {
            Ok(expr) => expr,
            Err(err) => {
                warn!(definition_id = %id, error = %err, "Index definition failed validation");
                return Err(err.into());
            }
        };

        let mut next = current.transition(DefinitionState::Validated);
        next.formula = Some(expr);
        next.validated_against = Some(standard_id.to_string());

        info!(definition_id = %id, standard = %standard_id, "Index definition validated");
        self.insert(next);
        self.lookup(id)
    }

    /// Freeze a validated definition
    pub fn save(&mut self, id: Uuid) -> EngineResult<Arc<IndexDefinition>> {
        self.advance(id, DefinitionState::Validated, DefinitionState::Saved)
    }

    /// Exclude a saved definition from new computations. It stays in the
    /// catalog for historical results.
    pub fn deprecate(&mut self, id: Uuid) -> EngineResult<Arc<IndexDefinition>> {
        self.advance(id, DefinitionState::Saved, DefinitionState::Deprecated)
    }

    fn advance(
        &mut self,
        id: Uuid,
        from: DefinitionState,
        to: DefinitionState,
    ) -> EngineResult<Arc<IndexDefinition>> {
        let current = self.lookup(id)?;
        if current.state != from {
            return Err(ValidationError::InvalidTransition {
                from: current.state,
                to,
            }
            .into());
        }
        debug!(definition_id = %id, from = %from, to = %to, "Index definition transition");
        self.insert(current.transition(to));
        self.lookup(id)
    }

    /// Start a new draft from an existing definition's authoring fields
    pub fn revise(&mut self, id: Uuid, name: &str) -> EngineResult<Uuid> {
        let source = self.lookup(id)?;
        if source.kind.is_builtin() {
            return Err(ValidationError::InvalidInput(format!(
                "built-in index {} cannot be revised",
                source.name
            ))
            .into());
        }
        let draft = self.create_definition(
            name,
            source.formula_text.as_deref().unwrap_or_default(),
            source.parameters.clone(),
            source.weights.clone(),
            source.bands.bands().to_vec(),
        )?;
        Ok(draft)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<IndexDefinition>> {
        self.definitions.get(&id).cloned()
    }

    /// Non-deprecated definition with the given name
    pub fn find_by_name(&self, name: &str) -> Option<Arc<IndexDefinition>> {
        self.order
            .iter()
            .filter_map(|id| self.definitions.get(id))
            .find(|d| d.name == name && d.state != DefinitionState::Deprecated)
            .cloned()
    }

    /// Definitions usable by a new batch, in creation order
    pub fn active(&self) -> Vec<Arc<IndexDefinition>> {
        self.list()
            .into_iter()
            .filter(|d| d.state.is_computable())
            .collect()
    }

    /// All definitions, in creation order
    pub fn list(&self) -> Vec<Arc<IndexDefinition>> {
        self.order
            .iter()
            .filter_map(|id| self.definitions.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
