use tracing::*;

use crate::timeline::EventNode;

use super::results::MetricResult;

/// Which of the matched events take part in an aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Every matched event.
    #[default]
    None,
    /// Only the last `count` events by start time, used to skip warm-up iterations.
    ///
    /// The count comes from the page and is only trustworthy once the page reported
    /// it is done, hence `completion_observed`.
    LastN {
        count: i64,
        completion_observed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    /// Nothing matched, or trimming left nothing. The metric is skipped.
    #[error("No events to aggregate for {metric}")]
    EmptyInput { metric: String },
    /// Trimming was requested in a state where the trim count cannot be trusted.
    #[error("Cannot trim events for {metric}: {reason}")]
    Precondition { metric: String, reason: String },
    /// The metric asks for a unit durations cannot be expressed in.
    #[error("Unsupported duration unit {unit:?} for {metric}")]
    UnsupportedUnit { metric: String, unit: String },
}

/// Microseconds in one `unit`.
fn micros_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "us" | "µs" => Some(1.0),
        "ms" => Some(1_000.0),
        "s" => Some(1_000_000.0),
        _ => None,
    }
}

impl MetricError {
    pub fn is_empty_input(&self) -> bool {
        matches!(self, Self::EmptyInput { .. })
    }
}

/// Reduces a start-ordered event sequence to a single mean duration, expressed in the
/// metric's unit (`us`, `ms` or `s`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricAggregator {
    metric_name: String,
    unit: String,
}

impl MetricAggregator {
    pub fn new(metric_name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            unit: unit.into(),
        }
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Apply `policy` to `events`, which must be ordered by start time.
    pub fn trim<'a, 'e>(
        &self,
        events: &'a [&'e EventNode],
        policy: TrimPolicy,
    ) -> Result<&'a [&'e EventNode], MetricError> {
        match policy {
            TrimPolicy::None => Ok(events),
            TrimPolicy::LastN {
                completion_observed: false,
                ..
            } => Err(MetricError::Precondition {
                metric: self.metric_name.clone(),
                reason: "the page has not signaled completion".to_string(),
            }),
            TrimPolicy::LastN { count, .. } if count <= 0 => Err(MetricError::Precondition {
                metric: self.metric_name.clone(),
                reason: format!("iteration count must be positive, got {count}"),
            }),
            TrimPolicy::LastN { count, .. } => {
                let keep = usize::try_from(count).unwrap_or(usize::MAX);
                Ok(&events[events.len().saturating_sub(keep)..])
            }
        }
    }

    /// Mean duration of the events kept by `policy`.
    pub fn aggregate(
        &self,
        events: &[&EventNode],
        policy: TrimPolicy,
    ) -> Result<MetricResult, MetricError> {
        let scale = micros_per_unit(&self.unit).ok_or_else(|| MetricError::UnsupportedUnit {
            metric: self.metric_name.clone(),
            unit: self.unit.clone(),
        })?;

        let kept = self.trim(events, policy)?;
        if kept.is_empty() {
            return Err(MetricError::EmptyInput {
                metric: self.metric_name.clone(),
            });
        }

        let total_micros: f64 = kept.iter().map(|event| event.duration_micros as f64).sum();
        let mean = total_micros / kept.len() as f64 / scale;

        trace!(
            "{}: {} of {} events, mean {mean:.3} {}",
            self.metric_name,
            kept.len(),
            events.len(),
            self.unit
        );

        Ok(MetricResult::new(&self.metric_name, &self.unit, mean))
    }
}
