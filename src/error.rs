use thiserror::Error;

/// Failure modes surfaced to callers. Artifact corruption is deliberately
/// absent: the store recovers it locally by discarding the file, and callers
/// only ever observe "no model".
#[derive(Debug, Error)]
pub enum PriceError {
    /// Network or markup failure while walking the catalog. Aborts the whole
    /// fetch; a partial dataset is never returned as if complete.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// The fetched dataset has no usable rows, or training produced an empty
    /// feature set / training split. The model state stays at NoModel.
    #[error("no usable training data: {0}")]
    DataEmpty(String),

    /// A prediction request omitted a required field. The request is rejected;
    /// no partial prediction is attempted.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Predict was called with no trained model loaded.
    #[error("no trained model available, run train first")]
    ModelNotReady,

    /// A trained artifact could not be written to disk.
    #[error("failed to persist model artifact: {0}")]
    Persist(String),
}
