use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::PageDefinition;

/// One recorded page visit: what was loaded, the trace it produced and what the page
/// answered to each evaluated expression.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Capture {
    pub page: PageDefinition,
    pub trace: Value,
    #[serde(default)]
    pub evaluations: HashMap<String, Value>,
}

impl Capture {
    pub fn new(page: PageDefinition, trace: Value) -> Self {
        Self {
            page,
            trace,
            evaluations: HashMap::new(),
        }
    }

    pub fn with_evaluation(mut self, expression: impl Into<String>, value: Value) -> Self {
        self.evaluations.insert(expression.into(), value);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture {path:?}"))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse capture {path:?}"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write capture {path:?}"))
    }
}
