use thiserror::Error;

/// Errors surfaced by the ingest pipeline and its collaborators.
///
/// Every variant is fatal for the current run: the pipeline surfaces the
/// first error to its caller and performs no retries.
#[derive(Error, Debug)]
pub enum LappError {
    #[error("read log source: {0}")]
    Source(#[from] std::io::Error),

    #[error("invalid first-line regex: {0}")]
    DetectorConfig(#[from] regex::Error),

    #[error("labeler transport: {0}")]
    LabelerTransport(String),

    #[error("labeler decode: {0}")]
    LabelerDecode(String),

    #[error("store {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("labels json: {0}")]
    LabelsJson(#[from] serde_json::Error),

    #[error("ingest cancelled")]
    Cancelled,
}

impl LappError {
    /// Wrap a store error with the operation that produced it.
    pub(crate) fn store(op: &'static str) -> impl FnOnce(duckdb::Error) -> LappError {
        move |source| LappError::Store { op, source }
    }
}
