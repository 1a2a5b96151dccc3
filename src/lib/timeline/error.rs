pub type Result<T> = std::result::Result<T, TimelineError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    /// A structurally invalid record. Unmatched markers never end up here.
    #[error("Malformed trace stream at record {index}: {reason}")]
    MalformedStream { index: usize, reason: String },
}

impl TimelineError {
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedStream {
            index,
            reason: reason.into(),
        }
    }
}
