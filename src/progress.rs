//! Progress-callback trait for batch runs.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] into
//! [`crate::runner::Pipeline::run_batch`] to receive events as each object
//! is handled. The CLI forwards them to an `indicatif` progress bar; other
//! hosts can forward them to a channel or a log.
//!
//! # Example
//!
//! ```rust
//! use georef_pipeline::{BatchProgressCallback, InvocationStatus};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl BatchProgressCallback for FailureCounter {
//!     fn on_object_complete(&self, _key: &str, status: &InvocationStatus) {
//!         if status.is_failure() {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::output::InvocationStatus;
use std::sync::Arc;

/// Called by the runner as it works through a batch.
///
/// Objects are handled concurrently, so `on_object_start` and
/// `on_object_complete` may be called from different tasks at once.
/// All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any object is handled.
    fn on_batch_start(&self, total_objects: usize) {
        let _ = total_objects;
    }

    /// Called before an object is routed to its stage.
    fn on_object_start(&self, key: &str) {
        let _ = key;
    }

    /// Called with the final status of one object.
    ///
    /// When the Compressor's output is chained into the Extractor this is
    /// the Extractor's status.
    fn on_object_complete(&self, key: &str, status: &InvocationStatus) {
        let _ = (key, status);
    }

    /// Called once after every object has been attempted.
    fn on_batch_complete(&self, total_objects: usize, failed: usize) {
        let _ = (total_objects, failed);
    }
}

/// Default when no callback is supplied.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Stage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        started: AtomicUsize,
        failed: AtomicUsize,
        total: AtomicUsize,
    }

    impl BatchProgressCallback for Tracking {
        fn on_batch_start(&self, total_objects: usize) {
            self.total.store(total_objects, Ordering::SeqCst);
        }

        fn on_object_start(&self, _key: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_object_complete(&self, _key: &str, status: &InvocationStatus) {
            if status.is_failure() {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(2);
        cb.on_object_start("raw/a.tif");
        cb.on_object_complete("raw/a.tif", &InvocationStatus::skipped("raw/a.tif", "x"));
        cb.on_batch_complete(2, 0);
    }

    #[test]
    fn tracking_callback_counts_failures() {
        let cb = Tracking::default();
        cb.on_batch_start(2);
        cb.on_object_start("raw/a.tif");
        cb.on_object_complete(
            "raw/a.tif",
            &InvocationStatus::Failed {
                key: "raw/a.tif".into(),
                stage: Stage::Compress,
                error: "boom".into(),
                error_record: None,
            },
        );
        cb.on_object_start("raw/b.txt");
        cb.on_object_complete("raw/b.txt", &InvocationStatus::skipped("raw/b.txt", "not a TIFF"));

        assert_eq!(cb.total.load(Ordering::SeqCst), 2);
        assert_eq!(cb.started.load(Ordering::SeqCst), 2);
        assert_eq!(cb.failed.load(Ordering::SeqCst), 1);
    }
}
