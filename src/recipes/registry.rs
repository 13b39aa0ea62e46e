//! Named budget overrides for recipes.
//!
//! Operators tune waits per resource kind without touching code:
//!
//! ```yaml
//! instance_ready:
//!   kind: deadline
//!   timeout_secs: 3600
//!   interval_secs: 15
//! configuration_read:
//!   kind: attempts
//!   max_attempts: 8
//!   initial_delay_secs: 5
//! ```

use super::{Recipe, RecipeKind};
use crate::budget::BudgetConfig;
use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct RecipeRegistry {
    overrides: HashMap<RecipeKind, BudgetConfig>,
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse overrides from YAML. Unknown recipe names and invalid budgets are rejected.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let overrides: HashMap<RecipeKind, BudgetConfig> = serde_yaml::from_str(content)
            .map_err(|e| {
                Error::configuration_with_context(
                    "invalid recipe overrides",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source("recipe_registry"),
                )
            })?;

        let mut registry = Self::new();
        for (kind, budget) in overrides {
            registry.set(kind, budget)?;
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                "cannot read recipe overrides",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(e.to_string())
                    .with_source("recipe_registry"),
            )
        })?;
        let registry = Self::from_yaml(&content)?;
        info!(
            path = %path.display(),
            overrides = registry.overrides.len(),
            "loaded recipe budget overrides"
        );
        Ok(registry)
    }

    /// Apply `<PREFIX>_<RECIPE>_*` env budgets on top, e.g. `CP_POLL_JOB_TIMEOUT_SECS`.
    pub fn with_env_overrides(mut self, prefix: &str) -> Result<Self> {
        for kind in RecipeKind::ALL {
            let var_prefix = format!("{}_{}", prefix, kind.name().to_uppercase());
            if let Some(budget) = BudgetConfig::from_env(&var_prefix) {
                self.set(kind, budget)?;
            }
        }
        Ok(self)
    }

    pub fn set(&mut self, kind: RecipeKind, budget: BudgetConfig) -> Result<()> {
        kind.check_budget(&budget)?;
        self.overrides.insert(kind, budget);
        Ok(())
    }

    /// Effective budget for `kind`: the override if present, else the recipe default.
    pub fn budget_for(&self, kind: RecipeKind) -> BudgetConfig {
        self.overrides
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_budget())
    }

    pub fn is_overridden(&self, kind: RecipeKind) -> bool {
        self.overrides.contains_key(&kind)
    }

    /// Give `recipe` the effective budget for its kind.
    pub fn configure<S, P>(&self, recipe: Recipe<S, P>) -> Recipe<S, P> {
        let budget = self.budget_for(recipe.kind());
        recipe.with_budget(budget)
    }
}
