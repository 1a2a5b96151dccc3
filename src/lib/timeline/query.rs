//! Read-only queries over a built [`TimelineModel`].

use super::{model::TimelineModel, types::EventNode};

impl TimelineModel {
    /// All events with exactly this name, ordered by start time.
    ///
    /// Served from the index built at construction; unknown names yield an empty list.
    pub fn all_events_named(&self, name: &str) -> Vec<&EventNode> {
        self.indexed(name)
            .iter()
            .filter_map(|id| self.node(*id))
            .collect()
    }

    /// Distinct event names, sorted.
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index_keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Earliest start and latest end over all events.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let start = self.nodes().map(|node| node.start_micros).min()?;
        let end = self.nodes().map(EventNode::end_micros).max()?;
        Some((start, end))
    }

    /// `node` and every event nested below it, depth first.
    pub fn descendants<'a>(&'a self, node: &'a EventNode) -> Vec<&'a EventNode> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children: Vec<&EventNode> = self.children(current).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }
}

/// Free-function form of [`TimelineModel::all_events_named`].
pub fn all_events_named<'a>(model: &'a TimelineModel, name: &str) -> Vec<&'a EventNode> {
    model.all_events_named(name)
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    use super::*;
    use crate::timeline::{builder::TimelineBuilder, types::EventRecord};

    fn sample_records() -> Vec<EventRecord> {
        let mut records = Vec::new();
        for thread in 1..=4 {
            for i in 0..10 {
                let start = i * 1000 + thread;
                records.push(EventRecord::begin("Decode Image", start).on_thread(1, thread));
                records.push(EventRecord::complete("Resize", start + 1, 5).on_thread(1, thread));
                records.push(EventRecord::end("Decode Image", start + 100).on_thread(1, thread));
            }
        }
        records.push(EventRecord::async_begin("Load", "r1", 10).on_thread(2, 1));
        records.push(EventRecord::async_end("Load", "r1", 5000).on_thread(3, 1));
        records
    }

    fn summary(model: &TimelineModel, name: &str) -> Vec<(i64, i64, i64)> {
        all_events_named(model, name)
            .iter()
            .map(|node| (node.start_micros, node.duration_micros, node.thread.thread_id))
            .collect()
    }

    #[test]
    fn unknown_name_is_empty() {
        let model = TimelineBuilder::build(sample_records()).unwrap();
        assert!(model.all_events_named("Nope").is_empty());
    }

    #[test]
    fn results_are_ordered_by_start() {
        let model = TimelineBuilder::build(sample_records()).unwrap();
        let starts: Vec<i64> = model
            .all_events_named("Decode Image")
            .iter()
            .map(|node| node.start_micros)
            .collect();

        assert_eq!(starts.len(), 40);
        assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn results_do_not_depend_on_cross_thread_interleaving() {
        let expected = TimelineBuilder::build(sample_records()).unwrap();

        // Shuffle whole threads relative to each other, keeping each thread's own order.
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let mut threads: Vec<Vec<EventRecord>> = (1..=4)
                .map(|thread| {
                    sample_records()
                        .into_iter()
                        .filter(|r| r.process_id == 1 && r.thread_id == thread)
                        .collect()
                })
                .collect();
            threads.shuffle(&mut rng);

            let mut records: Vec<EventRecord> = Vec::new();
            let mut cursors = vec![0usize; threads.len()];
            while cursors.iter().zip(&threads).any(|(c, t)| *c < t.len()) {
                let candidates: Vec<usize> = (0..threads.len())
                    .filter(|i| cursors[*i] < threads[*i].len())
                    .collect();
                let pick = *candidates.choose(&mut rng).unwrap();
                records.push(threads[pick][cursors[pick]].clone());
                cursors[pick] += 1;
            }
            records.push(EventRecord::async_end("Load", "r1", 5000).on_thread(3, 1));
            records.insert(0, EventRecord::async_begin("Load", "r1", 10).on_thread(2, 1));

            let model = TimelineBuilder::build(records).unwrap();
            for name in ["Decode Image", "Resize", "Load"] {
                assert_eq!(summary(&model, name), summary(&expected, name));
            }
        }
    }

    #[test]
    fn event_names_and_bounds() {
        let model = TimelineBuilder::build(sample_records()).unwrap();
        assert_eq!(model.event_names(), vec!["Decode Image", "Load", "Resize"]);
        assert_eq!(model.bounds(), Some((1, 9104)));
    }

    #[test]
    fn descendants_walk_depth_first() {
        let model = TimelineBuilder::build(vec![
            EventRecord::complete("Frame", 0, 100),
            EventRecord::complete("Paint", 10, 20),
            EventRecord::complete("Decode Image", 12, 5),
            EventRecord::complete("Composite", 50, 10),
        ])
        .unwrap();

        let frame = model.all_events_named("Frame")[0];
        let names: Vec<&str> = model
            .descendants(frame)
            .iter()
            .map(|node| node.name.as_str())
            .collect();
        assert_eq!(names, vec!["Frame", "Paint", "Decode Image", "Composite"]);
    }
}
