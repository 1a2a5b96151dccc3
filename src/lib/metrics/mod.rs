pub mod aggregator;
pub mod results;

pub use aggregator::{MetricAggregator, MetricError, TrimPolicy};
pub use results::{MetricResult, PageResults, ResultSet, ResultsSink};
