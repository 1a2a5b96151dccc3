use std::collections::{BTreeMap, HashMap};

use tracing::*;

use super::{
    error::{Result, TimelineError},
    model::{ThreadTimeline, TimelineModel},
    types::{EventNode, EventRecord, NodeId, Phase, ThreadKey},
};

/// A node whose duration is known but whose place in the forest is not yet decided.
#[derive(Debug, Clone)]
struct ResolvedEvent {
    name: String,
    category: String,
    start_micros: i64,
    duration_micros: i64,
    thread: ThreadKey,
    is_async: bool,
    /// Position of the record that opened this event in the input stream.
    seq: usize,
}

#[derive(Debug)]
struct SequencedRecord {
    seq: usize,
    record: EventRecord,
}

#[derive(Debug, Default)]
struct DropCounters {
    unmatched_ends: usize,
    unmatched_begins: usize,
    async_without_id: usize,
    async_unpaired: usize,
    async_duplicates: usize,
    /// Spans whose end does not fit the timestamp range.
    out_of_range: usize,
}

/// Turns a raw record stream into a [`TimelineModel`].
///
/// Records are validated and partitioned as they are pushed; pairing, nesting and
/// indexing happen once in [`TimelineBuilder::finish`]. Unmatched markers are dropped
/// silently since truncated captures are expected when a renderer dies mid-trace.
#[derive(Debug, Default)]
pub struct TimelineBuilder {
    next_seq: usize,
    per_thread: BTreeMap<ThreadKey, Vec<SequencedRecord>>,
    async_records: Vec<SequencedRecord>,
    resolved: Vec<ResolvedEvent>,
    dropped: DropCounters,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from a complete record stream.
    pub fn build<I>(records: I) -> Result<TimelineModel>
    where
        I: IntoIterator<Item = EventRecord>,
    {
        let mut builder = Self::new();
        for record in records {
            builder.push(record)?;
        }
        Ok(builder.finish())
    }

    pub fn push(&mut self, record: EventRecord) -> Result<()> {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(duration) = record.duration_micros {
            if duration < 0 {
                return Err(TimelineError::malformed(
                    seq,
                    format!("event {:?} has negative duration {duration}", record.name),
                ));
            }
        }

        match record.phase {
            Phase::Complete => {
                let Some(duration) = record.duration_micros else {
                    return Err(TimelineError::malformed(
                        seq,
                        format!("complete event {:?} has no duration", record.name),
                    ));
                };
                if record.timestamp_micros.checked_add(duration).is_none() {
                    self.dropped.out_of_range += 1;
                    return Ok(());
                }
                self.resolved.push(ResolvedEvent {
                    thread: record.thread(),
                    name: record.name,
                    category: record.category,
                    start_micros: record.timestamp_micros,
                    duration_micros: duration,
                    is_async: false,
                    seq,
                });
            }
            Phase::Instant => {
                self.resolved.push(ResolvedEvent {
                    thread: record.thread(),
                    name: record.name,
                    category: record.category,
                    start_micros: record.timestamp_micros,
                    duration_micros: 0,
                    is_async: false,
                    seq,
                });
            }
            Phase::Begin | Phase::End => {
                self.per_thread
                    .entry(record.thread())
                    .or_default()
                    .push(SequencedRecord { seq, record });
            }
            Phase::AsyncBegin | Phase::AsyncEnd => {
                self.async_records.push(SequencedRecord { seq, record });
            }
        }

        Ok(())
    }

    pub fn finish(mut self) -> TimelineModel {
        let per_thread = std::mem::take(&mut self.per_thread);
        for (thread, records) in per_thread {
            self.pair_thread_markers(thread, records);
        }

        let async_records = std::mem::take(&mut self.async_records);
        self.pair_async_markers(async_records);

        let dropped = &self.dropped;
        if dropped.unmatched_begins
            + dropped.unmatched_ends
            + dropped.async_without_id
            + dropped.async_unpaired
            + dropped.async_duplicates
            + dropped.out_of_range
            > 0
        {
            debug!("Dropped unmatched trace markers: {dropped:?}");
        }

        assemble(self.resolved)
    }

    /// LIFO pairing of Begin/End markers on a single thread.
    fn pair_thread_markers(&mut self, thread: ThreadKey, mut records: Vec<SequencedRecord>) {
        // Stable: markers sharing a timestamp keep their stream order.
        records.sort_by_key(|entry| entry.record.timestamp_micros);

        let mut open: Vec<SequencedRecord> = Vec::new();
        for entry in records {
            match entry.record.phase {
                Phase::Begin => open.push(entry),
                Phase::End => {
                    // Chrome allows End markers without a name: they close the innermost slice.
                    let position = if entry.record.name.is_empty() {
                        open.len().checked_sub(1)
                    } else {
                        open.iter()
                            .rposition(|begin| begin.record.name == entry.record.name)
                    };

                    let Some(position) = position else {
                        self.dropped.unmatched_ends += 1;
                        continue;
                    };

                    // Sorted by timestamp, so the duration cannot be negative.
                    let begin = open.remove(position);
                    let Some(duration_micros) = entry
                        .record
                        .timestamp_micros
                        .checked_sub(begin.record.timestamp_micros)
                    else {
                        self.dropped.out_of_range += 1;
                        continue;
                    };
                    self.resolved.push(ResolvedEvent {
                        duration_micros,
                        name: begin.record.name,
                        category: begin.record.category,
                        start_micros: begin.record.timestamp_micros,
                        thread,
                        is_async: false,
                        seq: begin.seq,
                    });
                }
                _ => unreachable!("only Begin/End markers are partitioned per thread"),
            }
        }

        self.dropped.unmatched_begins += open.len();
    }

    /// Pair async markers through their id, regardless of thread or arrival order.
    ///
    /// For every id only the chronologically first Begin is kept, and it is closed by
    /// the first End at or after it. Everything else for that id is dropped.
    fn pair_async_markers(&mut self, records: Vec<SequencedRecord>) {
        let mut by_id: HashMap<String, (Vec<SequencedRecord>, Vec<SequencedRecord>)> =
            HashMap::new();

        for entry in records {
            let Some(async_id) = entry.record.async_id.clone() else {
                self.dropped.async_without_id += 1;
                continue;
            };

            let (begins, ends) = by_id.entry(async_id).or_default();
            match entry.record.phase {
                Phase::AsyncBegin => begins.push(entry),
                Phase::AsyncEnd => ends.push(entry),
                _ => unreachable!("only async markers are correlated by id"),
            }
        }

        for (_async_id, (begins, ends)) in by_id {
            let total = begins.len() + ends.len();

            let Some(begin) = begins
                .into_iter()
                .min_by_key(|entry| (entry.record.timestamp_micros, entry.seq))
            else {
                self.dropped.async_unpaired += total;
                continue;
            };

            let end = ends
                .into_iter()
                .filter(|entry| entry.record.timestamp_micros >= begin.record.timestamp_micros)
                .min_by_key(|entry| (entry.record.timestamp_micros, entry.seq));

            let Some(end) = end else {
                self.dropped.async_unpaired += total;
                continue;
            };

            let Some(duration_micros) = end
                .record
                .timestamp_micros
                .checked_sub(begin.record.timestamp_micros)
            else {
                self.dropped.out_of_range += total;
                continue;
            };

            self.dropped.async_duplicates += total - 2;
            self.resolved.push(ResolvedEvent {
                thread: begin.record.thread(),
                start_micros: begin.record.timestamp_micros,
                duration_micros,
                name: begin.record.name,
                category: begin.record.category,
                is_async: true,
                seq: begin.seq,
            });
        }
    }
}

/// Nest resolved events by interval containment and build the name index.
fn assemble(resolved: Vec<ResolvedEvent>) -> TimelineModel {
    let mut per_thread: BTreeMap<ThreadKey, Vec<ResolvedEvent>> = BTreeMap::new();
    for event in resolved {
        per_thread.entry(event.thread).or_default().push(event);
    }

    let mut nodes: Vec<EventNode> = Vec::new();
    let mut sequence: Vec<usize> = Vec::new();
    let mut threads: BTreeMap<ThreadKey, ThreadTimeline> = BTreeMap::new();

    for (thread, mut events) in per_thread {
        // Longer events first on equal starts, so an enclosing slice precedes its children.
        events.sort_by(|a, b| {
            a.start_micros
                .cmp(&b.start_micros)
                .then(b.duration_micros.cmp(&a.duration_micros))
                .then(a.seq.cmp(&b.seq))
        });

        let timeline = threads.entry(thread).or_default();
        let mut ancestors: Vec<NodeId> = Vec::new();

        for event in events {
            let id = NodeId(nodes.len());
            let node = EventNode {
                id,
                name: event.name,
                category: event.category,
                start_micros: event.start_micros,
                duration_micros: event.duration_micros,
                thread,
                is_async: event.is_async,
                children: Vec::new(),
            };

            if node.is_async {
                timeline.async_events.push(id);
            } else {
                while let Some(parent) = ancestors.last() {
                    if nodes[parent.0].contains(&node) {
                        break;
                    }
                    ancestors.pop();
                }

                match ancestors.last() {
                    Some(parent) => nodes[parent.0].children.push(id),
                    None => timeline.roots.push(id),
                }
                ancestors.push(id);
            }

            nodes.push(node);
            sequence.push(event.seq);
        }
    }

    let mut index: HashMap<String, Vec<NodeId>> = HashMap::new();
    for node in &nodes {
        index.entry(node.name.clone()).or_default().push(node.id);
    }
    for ids in index.values_mut() {
        ids.sort_by_key(|id| {
            let node = &nodes[id.0];
            (node.start_micros, node.thread, sequence[id.0])
        });
    }

    TimelineModel::new(nodes, threads, index)
}
