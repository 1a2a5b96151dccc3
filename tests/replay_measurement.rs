use std::{collections::BTreeSet, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use timeline_metrics::{
    metrics::ResultSet,
    power::NoPowerMonitor,
    replay::{Capture, ReplayBrowser},
    session::{
        MeasurementDefinition, MeasurementSession, PageDefinition, SessionState, Tab, Timeouts,
        TracingController,
    },
};

fn timeouts() -> Timeouts {
    Timeouts {
        step_ms: 200,
        completion_ms: 200,
        poll_interval_ms: 5,
    }
}

fn hook_probe() -> String {
    MeasurementDefinition::default().hook_probe_expression
}

fn decode_capture(name: &str) -> Capture {
    Capture::new(
        PageDefinition::new(name, format!("http://localhost/{name}.html")),
        json!({
            "traceEvents": [
                {"name": "thread_name", "ph": "M", "pid": 1, "tid": 7, "args": {"name": "CrRendererMain"}},
                {"name": "Paint", "cat": "webkit", "ph": "B", "ts": 0, "pid": 1, "tid": 7},
                {"name": "Decode Image", "cat": "webkit", "ph": "B", "ts": 100, "pid": 1, "tid": 7},
                {"name": "Decode Image", "cat": "webkit", "ph": "E", "ts": 5100, "pid": 1, "tid": 7},
                {"name": "Paint", "cat": "webkit", "ph": "E", "ts": 6000, "pid": 1, "tid": 7},
                {"name": "Layout", "cat": "webkit", "ph": "X", "ts": 7000, "dur": 300, "pid": 1, "tid": 7},
            ]
        }),
    )
    .with_evaluation("isDone", json!(true))
    .with_evaluation("averageLoadingTimeMs()", json!(12.5))
}

async fn run(browser: ReplayBrowser, pages: &[PageDefinition]) -> (ResultSet, ReplayBrowser) {
    let mut session = MeasurementSession::new(
        browser,
        NoPowerMonitor,
        MeasurementDefinition::default(),
        timeouts(),
    );
    let result_set = session.run(pages).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.is_capture_active());
    (result_set, session.into_parts().0)
}

#[tokio::test]
async fn image_decoding_is_measured_from_a_replayed_capture() {
    let browser = ReplayBrowser::new(vec![decode_capture("decode")])
        .with_browser_evaluation(hook_probe(), json!(true));
    let pages = browser.pages();

    let (result_set, browser) = run(browser, &pages).await;

    let page = result_set.page("decode").unwrap();
    assert!(page.is_success(), "{page:?}");
    assert_eq!(page.get("ImageDecoding_avg").unwrap().value, 5.0);
    assert_eq!(page.get("ImageDecoding_avg").unwrap().unit, "ms");
    assert_eq!(page.get("ImageLoading_avg").unwrap().value, 12.5);
    assert_eq!(browser.restarts(), 0);
}

#[tokio::test]
async fn warm_up_iterations_are_trimmed() {
    // Two threads interleaved; the last three by start time are 30, 40 and 50 ms.
    let durations_ms = [10, 20, 30, 40, 50];
    let events: Vec<Value> = durations_ms
        .iter()
        .enumerate()
        .map(|(index, duration)| {
            json!({
                "name": "Decode Image",
                "ph": "X",
                "ts": index as i64 * 100_000,
                "dur": duration * 1000,
                "pid": 1,
                "tid": 10 + (index % 2),
            })
        })
        .collect();
    let capture = Capture::new(
        PageDefinition::new("real", "http://localhost/real.html").limited_to_min_iterations(),
        Value::Array(events),
    )
    .with_evaluation("isDone", json!(true))
    .with_evaluation("minIterations", json!(3));
    let browser =
        ReplayBrowser::new(vec![capture]).with_browser_evaluation(hook_probe(), json!(true));
    let pages = browser.pages();

    let (result_set, _) = run(browser, &pages).await;

    let page = result_set.page("real").unwrap();
    assert_eq!(page.get("ImageDecoding_avg").unwrap().value, 40.0);
    // Not recorded for this page.
    assert!(page.get("ImageLoading_avg").is_none());
}

#[tokio::test]
async fn a_failing_page_does_not_abort_the_run() {
    let browser = ReplayBrowser::new(vec![decode_capture("decode")])
        .with_browser_evaluation(hook_probe(), json!(true));
    let pages = vec![
        PageDefinition::new("missing", "http://localhost/missing.html"),
        PageDefinition::new("decode", "http://localhost/decode.html"),
    ];

    let (result_set, _) = run(browser, &pages).await;

    assert_eq!(result_set.pages.len(), 2);
    let missing = result_set.page("missing").unwrap();
    assert!(missing
        .failure
        .as_ref()
        .unwrap()
        .contains("No capture recorded"));
    assert!(missing.results.is_empty());
    assert_eq!(
        result_set
            .page("decode")
            .unwrap()
            .get("ImageDecoding_avg")
            .unwrap()
            .value,
        5.0
    );
}

#[tokio::test]
async fn browser_without_hooks_is_restarted_after_each_page() {
    let browser = ReplayBrowser::new(vec![decode_capture("a"), decode_capture("b")]);
    let pages = browser.pages();

    let (result_set, browser) = run(browser, &pages).await;

    assert_eq!(result_set.failures().count(), 0);
    assert_eq!(browser.restarts(), 2);
}

#[tokio::test]
async fn captures_are_read_from_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    decode_capture("decode")
        .save(&dir.path().join("01-decode.json"))
        .unwrap();

    let browser = ReplayBrowser::load(dir.path())
        .unwrap()
        .with_browser_evaluation(hook_probe(), json!(true));
    let pages = browser.pages();
    let (result_set, _) = run(browser, &pages).await;

    let serialized = serde_json::to_value(&result_set).unwrap();
    assert_eq!(
        serialized,
        json!({
            "pages": [{
                "page": "decode",
                "results": [
                    {"metric_name": "ImageDecoding_avg", "unit": "ms", "value": 5.0},
                    {"metric_name": "ImageLoading_avg", "unit": "ms", "value": 12.5},
                ]
            }]
        })
    );
}

/// Never answers whether the page is done.
struct UnresponsiveBrowser {
    inner: ReplayBrowser,
}

#[async_trait]
impl Tab for UnresponsiveBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.inner.navigate(url).await
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        if expression == "isDone" {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.evaluate(expression).await
    }

    async fn restart_browser(&mut self) -> Result<()> {
        self.inner.restart_browser().await
    }
}

#[async_trait]
impl TracingController for UnresponsiveBrowser {
    async fn start_tracing(&mut self, categories: &BTreeSet<String>) -> Result<()> {
        self.inner.start_tracing(categories).await
    }

    async fn stop_tracing(&mut self) -> Result<Value> {
        self.inner.stop_tracing().await
    }

    async fn is_tracing_active(&mut self) -> Result<bool> {
        self.inner.is_tracing_active().await
    }
}

#[tokio::test]
async fn unresponsive_page_times_out_and_tracing_is_stopped() {
    let inner = ReplayBrowser::new(vec![decode_capture("decode")])
        .with_browser_evaluation(hook_probe(), json!(true));
    let pages = inner.pages();
    let mut session = MeasurementSession::new(
        UnresponsiveBrowser { inner },
        NoPowerMonitor,
        MeasurementDefinition::default(),
        Timeouts {
            step_ms: 50,
            completion_ms: 10_000,
            poll_interval_ms: 5,
        },
    );

    let result_set = session.run(&pages).await;

    let page = result_set.page("decode").unwrap();
    assert!(page.failure.as_ref().unwrap().contains("timed out"));
    assert!(!session.is_capture_active());

    session.cleanup().await;
    session.cleanup().await;
    assert_eq!(session.state(), SessionState::Idle);

    let (mut browser, _) = session.into_parts();
    assert!(!browser.inner.is_tracing_active().await.unwrap());
    assert_eq!(browser.inner.restarts(), 0);
}
