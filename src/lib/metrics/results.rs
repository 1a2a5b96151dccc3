use serde::{Deserialize, Serialize};

/// One named, unit-tagged scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_name: String,
    pub unit: String,
    pub value: f64,
}

impl MetricResult {
    pub fn new(metric_name: impl Into<String>, unit: impl Into<String>, value: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            unit: unit.into(),
            value,
        }
    }

    pub fn emit(&self, sink: &mut dyn ResultsSink) {
        sink.add(&self.metric_name, &self.unit, self.value);
    }
}

/// Append-only destination of metric results.
pub trait ResultsSink: Send {
    fn add(&mut self, metric_name: &str, unit: &str, value: f64);
}

impl ResultsSink for Vec<MetricResult> {
    fn add(&mut self, metric_name: &str, unit: &str, value: f64) {
        self.push(MetricResult::new(metric_name, unit, value));
    }
}

/// Everything a single page visit produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResults {
    pub page: String,
    pub results: Vec<MetricResult>,
    /// Why the visit did not complete normally, if it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PageResults {
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, metric_name: &str) -> Option<&MetricResult> {
        self.results
            .iter()
            .find(|result| result.metric_name == metric_name)
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl ResultsSink for PageResults {
    fn add(&mut self, metric_name: &str, unit: &str, value: f64) {
        self.results.add(metric_name, unit, value);
    }
}

/// Results of a multi-page run, in visit order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub pages: Vec<PageResults>,
}

impl ResultSet {
    pub fn page(&self, name: &str) -> Option<&PageResults> {
        self.pages.iter().find(|page| page.page == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PageResults> {
        self.pages.iter().filter(|page| !page.is_success())
    }
}
