use serde::{Deserialize, Serialize};

/// Phase of a trace record.
///
/// This is the closed set of phases the timeline understands. Anything else is
/// rejected (or skipped, for Chrome phases we know but do not model) while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Begin,
    End,
    Complete,
    AsyncBegin,
    AsyncEnd,
    Instant,
}

/// One normalized trace record, as received from the tracing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub phase: Phase,
    pub timestamp_micros: i64,
    /// Only meaningful for [`Phase::Complete`].
    pub duration_micros: Option<i64>,
    pub process_id: i64,
    pub thread_id: i64,
    /// Correlates [`Phase::AsyncBegin`] and [`Phase::AsyncEnd`] records.
    pub async_id: Option<String>,
    pub category: String,
}

impl EventRecord {
    pub fn new(name: impl Into<String>, phase: Phase, timestamp_micros: i64) -> Self {
        Self {
            name: name.into(),
            phase,
            timestamp_micros,
            duration_micros: None,
            process_id: 0,
            thread_id: 0,
            async_id: None,
            category: String::new(),
        }
    }

    pub fn begin(name: impl Into<String>, timestamp_micros: i64) -> Self {
        Self::new(name, Phase::Begin, timestamp_micros)
    }

    pub fn end(name: impl Into<String>, timestamp_micros: i64) -> Self {
        Self::new(name, Phase::End, timestamp_micros)
    }

    pub fn complete(name: impl Into<String>, timestamp_micros: i64, duration_micros: i64) -> Self {
        Self::new(name, Phase::Complete, timestamp_micros).with_duration(duration_micros)
    }

    pub fn instant(name: impl Into<String>, timestamp_micros: i64) -> Self {
        Self::new(name, Phase::Instant, timestamp_micros)
    }

    pub fn async_begin(
        name: impl Into<String>,
        async_id: impl Into<String>,
        timestamp_micros: i64,
    ) -> Self {
        Self::new(name, Phase::AsyncBegin, timestamp_micros).with_async_id(async_id)
    }

    pub fn async_end(
        name: impl Into<String>,
        async_id: impl Into<String>,
        timestamp_micros: i64,
    ) -> Self {
        Self::new(name, Phase::AsyncEnd, timestamp_micros).with_async_id(async_id)
    }

    pub fn on_thread(mut self, process_id: i64, thread_id: i64) -> Self {
        self.process_id = process_id;
        self.thread_id = thread_id;
        self
    }

    pub fn with_duration(mut self, duration_micros: i64) -> Self {
        self.duration_micros = Some(duration_micros);
        self
    }

    pub fn with_async_id(mut self, async_id: impl Into<String>) -> Self {
        self.async_id = Some(async_id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn thread(&self) -> ThreadKey {
        ThreadKey {
            process_id: self.process_id,
            thread_id: self.thread_id,
        }
    }
}

/// Identifies the thread a node was recorded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThreadKey {
    pub process_id: i64,
    pub thread_id: i64,
}

impl std::fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.process_id, self.thread_id)
    }
}

/// Index of an [`EventNode`] inside its [`TimelineModel`](super::model::TimelineModel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

/// A duration-resolved event of the timeline.
///
/// Children are stored as ids into the owning model, ordered by start time. Use
/// [`TimelineModel::children`](super::model::TimelineModel::children) to walk them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventNode {
    pub id: NodeId,
    pub name: String,
    pub category: String,
    pub start_micros: i64,
    pub duration_micros: i64,
    pub thread: ThreadKey,
    pub is_async: bool,
    pub children: Vec<NodeId>,
}

impl EventNode {
    pub fn end_micros(&self) -> i64 {
        self.start_micros.saturating_add(self.duration_micros)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_micros as f64 / 1000.0
    }

    /// Closed interval containment: `[start, end]` of `other` lies within ours.
    pub fn contains(&self, other: &EventNode) -> bool {
        self.start_micros <= other.start_micros && other.end_micros() <= self.end_micros()
    }
}
