use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::metrics::ResultsSink;

use super::measurement::PageDefinition;

/// The page being measured, reached over a remote channel.
#[async_trait]
pub trait Tab: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluate a script expression on the page and return its JSON value.
    async fn evaluate(&mut self, expression: &str) -> Result<Value>;

    /// Replace the browser process so nothing from the previous page leaks into the next.
    async fn restart_browser(&mut self) -> Result<()>;
}

/// Trace capture of the browser hosting the [`Tab`].
#[async_trait]
pub trait TracingController: Send {
    /// Categories are passed through untouched.
    async fn start_tracing(&mut self, categories: &BTreeSet<String>) -> Result<()>;

    /// Stop capturing and hand back the raw Chrome trace.
    async fn stop_tracing(&mut self) -> Result<Value>;

    async fn is_tracing_active(&mut self) -> Result<bool>;
}

pub trait Browser: Tab + TracingController {}

impl<T: Tab + TracingController> Browser for T {}

/// Sampling-based power measurement bracketing the trace capture.
///
/// The tab is the target being measured, for monitors that sample through it.
#[async_trait]
pub trait PowerMonitor: Send {
    async fn start(&mut self, page: &PageDefinition, tab: &mut dyn Tab) -> Result<()>;

    async fn stop(&mut self, tab: &mut dyn Tab) -> Result<()>;

    fn report_into(&mut self, sink: &mut dyn ResultsSink);
}
