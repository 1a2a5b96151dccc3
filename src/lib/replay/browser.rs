use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::*;

use crate::session::{PageDefinition, Tab, TracingController};

use super::capture::Capture;

/// A browser that plays recorded captures back instead of loading pages.
///
/// Navigating to a URL selects the capture recorded for it. Expressions are answered
/// from that capture first, then from the browser-wide answers, and are `null` when
/// neither knows them.
#[derive(Debug, Default)]
pub struct ReplayBrowser {
    captures: Vec<Capture>,
    browser_evaluations: HashMap<String, Value>,
    current: Option<usize>,
    tracing: Option<BTreeSet<String>>,
    restarts: usize,
}

impl ReplayBrowser {
    pub fn new(captures: Vec<Capture>) -> Self {
        Self {
            captures,
            ..Default::default()
        }
    }

    /// Load every `*.json` capture of `dir`, ordered by file name.
    #[instrument(level = "debug")]
    pub fn load(dir: &Path) -> Result<Self> {
        let mut paths = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list captures in {dir:?}"))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|extension| extension == "json"))
            .collect::<Vec<_>>();
        paths.sort();

        let captures = paths
            .iter()
            .map(|path| Capture::load(path))
            .collect::<Result<Vec<_>>>()?;

        info!("Loaded {} capture(s) from {dir:?}", captures.len());
        Ok(Self::new(captures))
    }

    /// Answer `expression` on every page that does not answer it itself.
    pub fn with_browser_evaluation(mut self, expression: impl Into<String>, value: Value) -> Self {
        self.browser_evaluations.insert(expression.into(), value);
        self
    }

    pub fn pages(&self) -> Vec<PageDefinition> {
        self.captures
            .iter()
            .map(|capture| capture.page.clone())
            .collect()
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Categories of the running capture, if any.
    pub fn tracing_categories(&self) -> Option<&BTreeSet<String>> {
        self.tracing.as_ref()
    }

    fn current(&self) -> Option<&Capture> {
        self.current.map(|index| &self.captures[index])
    }
}

#[async_trait]
impl Tab for ReplayBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let index = self
            .captures
            .iter()
            .position(|capture| capture.page.url == url)
            .ok_or_else(|| anyhow!("No capture recorded for {url}"))?;

        debug!("Replaying {url}");
        self.current = Some(index);
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let value = self
            .current()
            .and_then(|capture| capture.evaluations.get(expression))
            .or_else(|| self.browser_evaluations.get(expression))
            .cloned()
            .unwrap_or_else(|| {
                trace!("No recorded answer for {expression:?}");
                Value::Null
            });
        Ok(value)
    }

    async fn restart_browser(&mut self) -> Result<()> {
        self.current = None;
        self.tracing = None;
        self.restarts += 1;
        Ok(())
    }
}

#[async_trait]
impl TracingController for ReplayBrowser {
    async fn start_tracing(&mut self, categories: &BTreeSet<String>) -> Result<()> {
        if self.tracing.is_some() {
            return Err(anyhow!("Tracing is already active"));
        }
        self.tracing = Some(categories.clone());
        Ok(())
    }

    async fn stop_tracing(&mut self) -> Result<Value> {
        if self.tracing.take().is_none() {
            return Err(anyhow!("Tracing is not active"));
        }

        Ok(self
            .current()
            .map(|capture| capture.trace.clone())
            .unwrap_or_else(|| Value::Array(vec![])))
    }

    async fn is_tracing_active(&mut self) -> Result<bool> {
        Ok(self.tracing.is_some())
    }
}
