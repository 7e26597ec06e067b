//! External file-insight annotation lookup.
//!
//! The lookup runs only after a transfer is already Completed; by
//! contract it never fails, so implementations must swallow their own
//! errors and fall back to a fixed annotation. Its outcome never changes
//! a record's Completed status.

use std::future::Future;
use std::pin::Pin;

/// Annotation returned when no better description is available.
pub const FALLBACK_ANNOTATION: &str = "no description available";

/// Asynchronous annotation lookup keyed by file metadata.
pub trait InsightLookup: Send + Sync {
    /// Produces a short descriptive annotation for a completed transfer.
    fn describe<'a>(
        &'a self,
        name: &'a str,
        mime_type: &'a str,
        size: u64,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>>;
}

/// Lookup that always answers with [`FALLBACK_ANNOTATION`].
#[derive(Debug, Default)]
pub struct FallbackInsight;

impl InsightLookup for FallbackInsight {
    fn describe<'a>(
        &'a self,
        _name: &'a str,
        _mime_type: &'a str,
        _size: u64,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(std::future::ready(FALLBACK_ANNOTATION.to_string()))
    }
}
