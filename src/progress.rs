//! Progress-callback trait for candidate-level extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe
//! the invoker as it walks the candidate list. The CLI uses this to drive a
//! spinner; a server could forward the events to a log or a websocket.
//!
//! # Example
//!
//! ```rust
//! use invoice_generator::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     attempts: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_candidate_start(&self, model: &str, index: usize, total: usize) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("trying {model} ({}/{total})", index + 1);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { attempts: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the invoker while it tries candidate models.
///
/// Candidates are attempted one after another, so calls never overlap for a
/// single extraction. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first candidate is tried.
    fn on_extraction_start(&self, total_candidates: usize) {
        let _ = total_candidates;
    }

    /// Called just before the generation request for `model` is sent.
    ///
    /// `index` is 0-based.
    fn on_candidate_start(&self, model: &str, index: usize, total: usize) {
        let _ = (model, index, total);
    }

    /// Called when a candidate fails.
    ///
    /// `falls_back` is true when the invoker will move on to the next
    /// candidate, false when the failure aborts the extraction.
    fn on_candidate_error(&self, model: &str, error: &str, falls_back: bool) {
        let _ = (model, error, falls_back);
    }

    /// Called when a candidate answers. No further candidates are tried.
    fn on_candidate_success(&self, model: &str, response_len: usize) {
        let _ = (model, response_len);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
