//! Decoding of Chrome Trace Event Format captures into [`EventRecord`]s.
//!
//! The capture is either a bare JSON array of events or an object carrying them in
//! `traceEvents`. Timestamps and durations are microseconds and may be fractional.

use serde::Deserialize;
use serde_json::Value;

use super::{
    error::{Result, TimelineError},
    types::{EventRecord, Phase},
};

/// Chrome phases that are valid in a capture but carry nothing the timeline models.
const IGNORED_PHASES: &[&str] = &[
    "M", "C", "n", "T", "p", "s", "t", "f", "P", "N", "O", "D", "V", "v", "R", "c", "(", ")",
    "=",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawId2 {
    global: Option<RawId>,
    local: Option<RawId>,
}

#[derive(Debug, Deserialize)]
struct RawTraceEvent {
    ph: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cat: Option<String>,
    #[serde(default)]
    ts: Option<f64>,
    #[serde(default)]
    dur: Option<f64>,
    #[serde(default)]
    pid: Option<i64>,
    #[serde(default)]
    tid: Option<i64>,
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    id2: Option<RawId2>,
}

fn async_id(id: Option<RawId>, id2: Option<RawId2>) -> Option<String> {
    if let Some(id) = id {
        return Some(id.into_string());
    }

    let id2 = id2?;
    match (id2.global, id2.local) {
        (Some(global), _) => Some(format!("global:{}", global.into_string())),
        (None, Some(local)) => Some(format!("local:{}", local.into_string())),
        (None, None) => None,
    }
}

fn phase_of(ph: &str) -> Option<Option<Phase>> {
    let phase = match ph {
        "B" => Phase::Begin,
        "E" => Phase::End,
        "X" => Phase::Complete,
        "b" | "S" => Phase::AsyncBegin,
        "e" | "F" => Phase::AsyncEnd,
        "i" | "I" => Phase::Instant,
        other if IGNORED_PHASES.contains(&other) => return Some(None),
        _ => return None,
    };

    Some(Some(phase))
}

/// Return the event array of a capture.
pub fn trace_events(trace: &Value) -> Result<&[Value]> {
    match trace {
        Value::Array(events) => Ok(events),
        Value::Object(object) => match object.get("traceEvents") {
            Some(Value::Array(events)) => Ok(events),
            Some(_) => Err(TimelineError::malformed(0, "traceEvents is not an array")),
            None => Err(TimelineError::malformed(0, "object has no traceEvents")),
        },
        _ => Err(TimelineError::malformed(
            0,
            "expected a JSON array or an object with traceEvents",
        )),
    }
}

/// Decode one raw event. `Ok(None)` means the phase is known but not modelled.
pub fn decode_event(index: usize, event: &Value) -> Result<Option<EventRecord>> {
    let raw = RawTraceEvent::deserialize(event)
        .map_err(|error| TimelineError::malformed(index, error.to_string()))?;

    let phase = match phase_of(&raw.ph) {
        Some(Some(phase)) => phase,
        Some(None) => return Ok(None),
        None => {
            return Err(TimelineError::malformed(
                index,
                format!("unrecognized phase {:?}", raw.ph),
            ))
        }
    };

    let Some(timestamp) = raw.ts else {
        return Err(TimelineError::malformed(index, "event has no timestamp"));
    };

    let name = match (raw.name, phase) {
        (Some(name), _) => name,
        (None, Phase::End) => String::new(),
        (None, _) => return Err(TimelineError::malformed(index, "event has no name")),
    };

    let duration_micros = raw.dur.map(|dur| dur.round() as i64);
    if let Some(duration) = duration_micros {
        if duration < 0 {
            return Err(TimelineError::malformed(
                index,
                format!("event {name:?} has negative duration {duration}"),
            ));
        }
    }

    Ok(Some(EventRecord {
        name,
        phase,
        timestamp_micros: timestamp.round() as i64,
        duration_micros,
        process_id: raw.pid.unwrap_or_default(),
        thread_id: raw.tid.unwrap_or_default(),
        async_id: async_id(raw.id, raw.id2),
        category: raw.cat.unwrap_or_default(),
    }))
}

/// Decode a whole capture, skipping phases the timeline does not model.
pub fn decode_chrome_trace(trace: &Value) -> Result<Vec<EventRecord>> {
    let events = trace_events(trace)?;

    let mut records = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        if let Some(record) = decode_event(index, event)? {
            records.push(record);
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::timeline::model::TimelineModel;

    #[test]
    fn decodes_array_and_object_forms() {
        let events = json!([
            {"name": "Decode Image", "cat": "webkit", "ph": "X", "ts": 10.4, "dur": 12000, "pid": 1, "tid": 2},
            {"name": "process_name", "ph": "M", "ts": 0, "pid": 1, "tid": 2, "args": {"name": "Renderer"}},
        ]);

        let from_array = decode_chrome_trace(&events).unwrap();
        let from_object = decode_chrome_trace(&json!({ "traceEvents": events })).unwrap();

        assert_eq!(from_array, from_object);
        assert_eq!(
            from_array,
            vec![EventRecord::complete("Decode Image", 10, 12000)
                .on_thread(1, 2)
                .with_category("webkit")]
        );
    }

    #[test]
    fn decodes_async_ids() {
        let records = decode_chrome_trace(&json!([
            {"name": "Load", "ph": "b", "ts": 1, "pid": 1, "tid": 1, "id": "0x2a"},
            {"name": "Load", "ph": "e", "ts": 9, "pid": 1, "tid": 3, "id": 42},
            {"name": "Fetch", "ph": "S", "ts": 2, "pid": 1, "tid": 1, "id2": {"local": "0x1"}},
        ]))
        .unwrap();

        assert_eq!(records[0].async_id.as_deref(), Some("0x2a"));
        assert_eq!(records[1].async_id.as_deref(), Some("42"));
        assert_eq!(records[2].async_id.as_deref(), Some("local:0x1"));
        assert_eq!(records[2].phase, Phase::AsyncBegin);
    }

    #[test]
    fn nameless_end_is_accepted() {
        let records = decode_chrome_trace(&json!([
            {"ph": "E", "ts": 5, "pid": 1, "tid": 1},
        ]))
        .unwrap();

        assert_eq!(records[0].phase, Phase::End);
        assert!(records[0].name.is_empty());
    }

    #[test]
    fn unknown_phase_is_malformed() {
        let error = decode_chrome_trace(&json!([
            {"name": "ok", "ph": "i", "ts": 1},
            {"name": "bad", "ph": "Q", "ts": 1},
        ]))
        .unwrap_err();

        assert_eq!(
            error,
            TimelineError::MalformedStream {
                index: 1,
                reason: "unrecognized phase \"Q\"".to_string()
            }
        );
    }

    #[test]
    fn negative_duration_is_malformed() {
        let error = decode_chrome_trace(&json!([
            {"name": "Decode Image", "ph": "X", "ts": 1, "dur": -3},
        ]))
        .unwrap_err();

        assert!(matches!(error, TimelineError::MalformedStream { index: 0, .. }));
    }

    #[test]
    fn missing_timestamp_is_malformed() {
        assert!(decode_chrome_trace(&json!([{"name": "x", "ph": "B"}])).is_err());
        assert!(decode_chrome_trace(&json!({"events": []})).is_err());
        assert!(decode_chrome_trace(&json!("trace")).is_err());
    }

    #[test]
    fn builds_model_from_capture() {
        let model = TimelineModel::from_chrome_trace(&json!({
            "traceEvents": [
                {"name": "Decode Image", "ph": "B", "ts": 0, "pid": 1, "tid": 1},
                {"name": "Decode Image", "ph": "E", "ts": 5000, "pid": 1, "tid": 1},
            ]
        }))
        .unwrap();

        let events = model.all_events_named("Decode Image");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_micros, 5000);
    }
}
