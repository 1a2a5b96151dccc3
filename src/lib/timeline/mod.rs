pub mod builder;
pub mod decode;
pub mod error;
pub mod model;
pub mod query;
pub mod types;

pub use builder::TimelineBuilder;
pub use error::TimelineError;
pub use model::{ThreadTimeline, TimelineModel};
pub use query::all_events_named;
pub use types::{EventNode, EventRecord, NodeId, Phase, ThreadKey};
