use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::{
    builder::TimelineBuilder,
    decode,
    error::Result,
    types::{EventNode, NodeId, ThreadKey},
};

/// Per-thread part of the timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadTimeline {
    /// Top-level slices, ordered by start.
    pub roots: Vec<NodeId>,
    /// Async slices that began on this thread. They are never nested.
    pub async_events: Vec<NodeId>,
}

/// The reconstructed timeline of one capture window.
///
/// Read-only once built: every accessor borrows, so a model can be shared between
/// readers freely.
#[derive(Debug, Clone, Default)]
pub struct TimelineModel {
    nodes: Vec<EventNode>,
    threads: BTreeMap<ThreadKey, ThreadTimeline>,
    index: HashMap<String, Vec<NodeId>>,
}

impl TimelineModel {
    pub(super) fn new(
        nodes: Vec<EventNode>,
        threads: BTreeMap<ThreadKey, ThreadTimeline>,
        index: HashMap<String, Vec<NodeId>>,
    ) -> Self {
        Self {
            nodes,
            threads,
            index,
        }
    }

    /// Decode a Chrome trace (array or object form) and build its timeline.
    pub fn from_chrome_trace(trace: &Value) -> Result<Self> {
        TimelineBuilder::build(decode::decode_chrome_trace(trace)?)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&EventNode> {
        self.nodes.get(id.0)
    }

    /// Every node, grouped by thread and ordered by start inside each thread.
    pub fn nodes(&self) -> impl Iterator<Item = &EventNode> {
        self.nodes.iter()
    }

    pub fn threads(&self) -> impl Iterator<Item = ThreadKey> + '_ {
        self.threads.keys().copied()
    }

    pub fn thread(&self, thread: ThreadKey) -> Option<&ThreadTimeline> {
        self.threads.get(&thread)
    }

    pub fn roots(&self, thread: ThreadKey) -> impl Iterator<Item = &EventNode> {
        self.ids(self.threads.get(&thread).map(|t| t.roots.as_slice()))
    }

    pub fn async_events(&self, thread: ThreadKey) -> impl Iterator<Item = &EventNode> {
        self.ids(self.threads.get(&thread).map(|t| t.async_events.as_slice()))
    }

    pub fn children<'a>(&'a self, node: &'a EventNode) -> impl Iterator<Item = &'a EventNode> {
        node.children.iter().map(|id| &self.nodes[id.0])
    }

    pub(super) fn indexed(&self, name: &str) -> &[NodeId] {
        self.index.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub(super) fn index_keys(&self) -> impl Iterator<Item = &String> {
        self.index.keys()
    }

    fn ids<'a>(&'a self, ids: Option<&'a [NodeId]>) -> impl Iterator<Item = &'a EventNode> {
        ids.unwrap_or_default().iter().map(|id| &self.nodes[id.0])
    }
}
