pub mod collaborators;
pub mod measurement;
#[allow(clippy::module_inception)]
pub mod session;

pub use collaborators::{Browser, PowerMonitor, Tab, TracingController};
pub use measurement::{MeasurementDefinition, PageDefinition, PageMetric, Timeouts, TraceMetric};
pub use session::{is_truthy, MeasurementSession, SessionError, SessionState};
