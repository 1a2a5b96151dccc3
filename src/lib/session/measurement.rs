use std::{collections::BTreeSet, time::Duration};

use serde::{Deserialize, Serialize};

/// A metric computed from the captured timeline.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TraceMetric {
    pub metric_name: String,
    pub event_name: String,
    pub unit: String,
}

/// A metric the page computes itself, merged verbatim into the results.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageMetric {
    pub metric_name: String,
    pub expression: String,
    pub unit: String,
}

/// How a scenario is instrumented and what it reports.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MeasurementDefinition {
    pub name: String,
    pub tracing_categories: BTreeSet<String>,
    /// Run before navigation to drop caches left by previous pages.
    pub clear_cache_script: String,
    /// Falsy when the browser lacks the instrumentation hooks this scenario relies on.
    pub hook_probe_expression: String,
    pub done_expression: String,
    pub iterations_expression: String,
    pub trace_metrics: Vec<TraceMetric>,
    pub page_metrics: Vec<PageMetric>,
}

impl Default for MeasurementDefinition {
    fn default() -> Self {
        Self {
            name: "image_decoding".to_string(),
            tracing_categories: ["webkit", "webkit.console"]
                .into_iter()
                .map(String::from)
                .collect(),
            clear_cache_script: concat!(
                "if (window.chrome && chrome.gpuBenchmarking && ",
                "chrome.gpuBenchmarking.clearImageCache) { ",
                "chrome.gpuBenchmarking.clearImageCache(); }"
            )
            .to_string(),
            hook_probe_expression: concat!(
                "!!(window.chrome && chrome.gpuBenchmarking && ",
                "chrome.gpuBenchmarking.clearImageCache)"
            )
            .to_string(),
            done_expression: "isDone".to_string(),
            iterations_expression: "minIterations".to_string(),
            trace_metrics: vec![TraceMetric {
                metric_name: "ImageDecoding_avg".to_string(),
                event_name: "Decode Image".to_string(),
                unit: "ms".to_string(),
            }],
            page_metrics: vec![PageMetric {
                metric_name: "ImageLoading_avg".to_string(),
                expression: "averageLoadingTimeMs()".to_string(),
                unit: "ms".to_string(),
            }],
        }
    }
}

/// One page visit of a run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageDefinition {
    pub name: String,
    pub url: String,
    /// Keep only the last `minIterations` events, skipping warm-up runs.
    #[serde(default)]
    pub limit_results_to_min_iterations: bool,
    /// Poll the done expression after navigation instead of sampling it once.
    #[serde(default = "default_true")]
    pub wait_for_completion: bool,
}

fn default_true() -> bool {
    true
}

impl PageDefinition {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            limit_results_to_min_iterations: false,
            wait_for_completion: true,
        }
    }

    pub fn limited_to_min_iterations(mut self) -> Self {
        self.limit_results_to_min_iterations = true;
        self
    }
}

/// Time limits for remote round-trips, in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timeouts {
    pub step_ms: u64,
    pub completion_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step_ms: 30_000,
            completion_ms: 60_000,
            poll_interval_ms: 100,
        }
    }
}

impl Timeouts {
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn completion(&self) -> Duration {
        Duration::from_millis(self.completion_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
