//! Progress reporting for pipeline stages.
//!
//! The pipeline reports through [`ProgressCallback`] so that it stays
//! independent of how progress is rendered. The `indicatif` implementation
//! lives in the CLI utilities crate.

/// Receives progress updates from a running pipeline.
///
/// Implementations must be `Send + Sync` so one instance can be shared
/// behind an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates. Used by tests and library callers that do
/// not render progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
