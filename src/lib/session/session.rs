use std::{future::Future, time::Duration};

use serde_json::Value;
use tracing::*;

use crate::{
    metrics::{MetricAggregator, MetricError, PageResults, ResultSet, ResultsSink, TrimPolicy},
    timeline::{TimelineError, TimelineModel},
};

use super::{
    collaborators::{Browser, PowerMonitor},
    measurement::{MeasurementDefinition, PageDefinition, Timeouts},
};

/// Where a page visit currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Caches cleared, power sampling and tracing started.
    Armed,
    Navigated,
    /// Waiting for the page to report it is done.
    Capturing,
    /// Trace retrieved and power sampling stopped.
    Stopped,
    Aggregated,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("{step} timed out after {timeout:?}")]
    Timeout {
        step: &'static str,
        timeout: Duration,
    },

    #[error("{step} failed: {source:#}")]
    Browser {
        step: &'static str,
        source: anyhow::Error,
    },

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Metric(#[from] MetricError),
}

/// Await a remote round-trip, bounded by `timeout`.
async fn remote<T>(
    step: &'static str,
    timeout: Duration,
    future: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, SessionError> {
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(SessionError::Browser { step, source }),
        Err(_) => Err(SessionError::Timeout { step, timeout }),
    }
}

/// JavaScript truthiness of an evaluated value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Iteration count reported by the page. Anything but a whole number reads as 0.
fn iteration_count(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|count| count.fract() == 0.0 && count.abs() < i64::MAX as f64)
                .map(|count| count as i64)
        })
        .unwrap_or_default()
}

/// Drives page visits: arm, navigate, capture, stop, aggregate, clean up.
///
/// Exactly one capture can be active at a time. The session owns that fact in
/// `capture_active`, so cleanup never needs to ask anyone else whether tracing runs.
pub struct MeasurementSession<B: Browser, P: PowerMonitor> {
    browser: B,
    power: P,
    definition: MeasurementDefinition,
    timeouts: Timeouts,
    state: SessionState,
    capture_active: bool,
    power_active: bool,
    stop_browser_after_page: bool,
}

impl<B: Browser, P: PowerMonitor> MeasurementSession<B, P> {
    pub fn new(browser: B, power: P, definition: MeasurementDefinition, timeouts: Timeouts) -> Self {
        Self {
            browser,
            power,
            definition,
            timeouts,
            state: SessionState::Idle,
            capture_active: false,
            power_active: false,
            stop_browser_after_page: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_capture_active(&self) -> bool {
        self.capture_active
    }

    pub fn will_stop_browser_after_page(&self) -> bool {
        self.stop_browser_after_page
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn into_parts(self) -> (B, P) {
        (self.browser, self.power)
    }

    /// Visit every page in order. A failing page never stops the run.
    #[instrument(level = "debug", skip_all, fields(measurement = %self.definition.name))]
    pub async fn run(&mut self, pages: &[PageDefinition]) -> ResultSet {
        let mut result_set = ResultSet::default();

        for page in pages {
            let results = self.measure_page(page).await;
            match &results.failure {
                Some(reason) => warn!("Page {:?} failed: {reason}", page.name),
                None => info!(
                    "Page {:?} measured: {} result(s)",
                    page.name,
                    results.results.len()
                ),
            }
            result_set.pages.push(results);
        }

        result_set
    }

    /// Measure one page. Failures are recorded in the returned results.
    #[instrument(level = "debug", skip(self), fields(page = %page.name))]
    pub async fn measure_page(&mut self, page: &PageDefinition) -> PageResults {
        let mut results = PageResults::new(&page.name);

        if let Err(error) = self.visit(page, &mut results).await {
            error!("Measurement of {:?} failed: {error}", page.name);
            results.failure = Some(error.to_string());
        }

        self.cleanup().await;

        results
    }

    async fn visit(
        &mut self,
        page: &PageDefinition,
        results: &mut PageResults,
    ) -> Result<(), SessionError> {
        self.arm(page).await?;
        self.navigate(page).await?;
        let completion_observed = self.wait_for_completion(page).await?;
        let trace = self.stop(&mut *results).await?;
        self.aggregate(page, &trace, completion_observed, results)
            .await
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        debug!("Session state: {from:?} -> {to:?}");
        self.state = to;
        Ok(())
    }

    /// Idle -> Armed.
    #[instrument(level = "debug", skip_all)]
    pub async fn arm(&mut self, page: &PageDefinition) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: SessionState::Armed,
            });
        }

        let step = self.timeouts.step();

        // A capture this session does not know about would bleed into our timeline.
        if remote("query tracing", step, self.browser.is_tracing_active()).await? {
            warn!("Browser was already tracing, discarding that capture");
            remote("stop stale tracing", step, self.browser.stop_tracing()).await?;
        }

        let hook_expression = self.definition.hook_probe_expression.clone();
        match remote("probe hooks", step, self.browser.evaluate(&hook_expression)).await {
            Ok(value) if is_truthy(&value) => {}
            Ok(_) => {
                warn!("Instrumentation hook is missing, the browser will be stopped after this page");
                self.stop_browser_after_page = true;
            }
            Err(error) => {
                warn!("Could not confirm the instrumentation hook ({error}), the browser will be stopped after this page");
                self.stop_browser_after_page = true;
            }
        }

        let clear_cache_script = self.definition.clear_cache_script.clone();
        remote(
            "clear caches",
            step,
            self.browser.evaluate(&clear_cache_script),
        )
        .await?;

        remote(
            "start power sampling",
            step,
            self.power.start(page, &mut self.browser),
        )
        .await?;
        self.power_active = true;

        let categories = self.definition.tracing_categories.clone();
        remote(
            "start tracing",
            step,
            self.browser.start_tracing(&categories),
        )
        .await?;
        self.capture_active = true;

        self.transition(SessionState::Idle, SessionState::Armed)
    }

    /// Armed -> Navigated.
    #[instrument(level = "debug", skip_all, fields(url = %page.url))]
    pub async fn navigate(&mut self, page: &PageDefinition) -> Result<(), SessionError> {
        if self.state != SessionState::Armed {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: SessionState::Navigated,
            });
        }

        remote("navigate", self.timeouts.step(), self.browser.navigate(&page.url)).await?;
        self.transition(SessionState::Armed, SessionState::Navigated)
    }

    /// Navigated -> Capturing, returning whether the page reported it is done.
    ///
    /// Running out of time is not an error: the capture is stopped either way.
    #[instrument(level = "debug", skip_all)]
    pub async fn wait_for_completion(
        &mut self,
        page: &PageDefinition,
    ) -> Result<bool, SessionError> {
        self.transition(SessionState::Navigated, SessionState::Capturing)?;

        let expression = self.definition.done_expression.clone();
        let step = self.timeouts.step();

        if !page.wait_for_completion {
            let done = remote("query completion", step, self.browser.evaluate(&expression)).await?;
            return Ok(is_truthy(&done));
        }

        let poll_interval = self.timeouts.poll_interval();
        let completion_timeout = self.timeouts.completion();
        let browser = &mut self.browser;
        let wait = async {
            loop {
                let done = remote("query completion", step, browser.evaluate(&expression)).await?;
                if is_truthy(&done) {
                    return Ok::<(), SessionError>(());
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(completion_timeout, wait).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(error)) => Err(error),
            Err(_) => {
                warn!("Page did not signal completion within {completion_timeout:?}, stopping the capture anyway");
                Ok(false)
            }
        }
    }

    /// Capturing -> Stopped: retrieve the trace and stop power sampling.
    #[instrument(level = "debug", skip_all)]
    pub async fn stop(&mut self, sink: &mut dyn ResultsSink) -> Result<Value, SessionError> {
        if self.state != SessionState::Capturing {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: SessionState::Stopped,
            });
        }

        let step = self.timeouts.step();

        // On failure the capture stays active so cleanup retries the stop.
        let trace = remote("stop tracing", step, self.browser.stop_tracing()).await?;
        self.capture_active = false;

        remote(
            "stop power sampling",
            step,
            self.power.stop(&mut self.browser),
        )
        .await?;
        self.power_active = false;
        self.power.report_into(sink);

        self.transition(SessionState::Capturing, SessionState::Stopped)?;
        Ok(trace)
    }

    /// Stopped -> Aggregated: build the timeline and emit every metric that has data.
    #[instrument(level = "debug", skip_all)]
    pub async fn aggregate(
        &mut self,
        page: &PageDefinition,
        trace: &Value,
        completion_observed: bool,
        sink: &mut dyn ResultsSink,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Stopped {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: SessionState::Aggregated,
            });
        }

        let model = TimelineModel::from_chrome_trace(trace)?;
        debug!("Timeline has {} events", model.len());

        let policy = self.trim_policy(page, completion_observed).await?;

        for metric in &self.definition.trace_metrics {
            let events = model.all_events_named(&metric.event_name);
            let aggregator = MetricAggregator::new(&metric.metric_name, &metric.unit);

            match aggregator.aggregate(&events, policy) {
                Ok(result) => result.emit(sink),
                Err(error @ MetricError::EmptyInput { .. }) => debug!("Skipping: {error}"),
                Err(error) => return Err(error.into()),
            }
        }

        let step = self.timeouts.step();
        for metric in &self.definition.page_metrics {
            let value = remote(
                "evaluate page metric",
                step,
                self.browser.evaluate(&metric.expression),
            )
            .await?;

            match value.as_f64() {
                Some(value) => sink.add(&metric.metric_name, &metric.unit, value),
                None => warn!(
                    "Page metric {:?} is not a number: {value}",
                    metric.metric_name
                ),
            }
        }

        self.transition(SessionState::Stopped, SessionState::Aggregated)
    }

    async fn trim_policy(
        &mut self,
        page: &PageDefinition,
        completion_observed: bool,
    ) -> Result<TrimPolicy, SessionError> {
        if !page.limit_results_to_min_iterations {
            return Ok(TrimPolicy::None);
        }

        // Without completion the count is not read at all; trimming reports the violation.
        let count = if completion_observed {
            let expression = self.definition.iterations_expression.clone();
            let value = remote(
                "query iterations",
                self.timeouts.step(),
                self.browser.evaluate(&expression),
            )
            .await?;
            iteration_count(&value)
        } else {
            0
        };

        Ok(TrimPolicy::LastN {
            count,
            completion_observed,
        })
    }

    /// Return to Idle from any state.
    ///
    /// An active capture is force-stopped and its buffer discarded. Safe to call any
    /// number of times; with nothing active it does nothing but reset the state.
    #[instrument(level = "debug", skip_all)]
    pub async fn cleanup(&mut self) {
        let step = self.timeouts.step();

        if self.capture_active {
            warn!("Capture still active during cleanup, discarding it");
            if let Err(error) = remote("force stop tracing", step, self.browser.stop_tracing()).await
            {
                error!("Failed to force stop tracing: {error}");
            }
            self.capture_active = false;
        }

        if self.power_active {
            if let Err(error) = remote(
                "force stop power sampling",
                step,
                self.power.stop(&mut self.browser),
            )
            .await
            {
                error!("Failed to stop power sampling: {error}");
            }
            self.power_active = false;
        }

        if self.stop_browser_after_page {
            info!("Restarting the browser");
            if let Err(error) = remote("restart browser", step, self.browser.restart_browser()).await
            {
                error!("Failed to restart the browser: {error}");
            }
            self.stop_browser_after_page = false;
        }

        if self.state != SessionState::Idle {
            debug!("Session state: {:?} -> Idle", self.state);
            self.state = SessionState::Idle;
        }
    }
}
