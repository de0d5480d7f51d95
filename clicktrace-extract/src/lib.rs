//! Marker extraction over a rendered page.
//!
//! The pipeline is split in two layers:
//!
//! - [`frame::FrameExtractor`]: runs the ordered [`strategy::Strategy`] chain
//!   against one document and returns the first hit.
//! - [`orchestrator::PageOrchestrator`]: walks a navigated page's frame
//!   topology (main document, same-origin frames, isolated probes of every
//!   iframe source) and finishes with one bounded wait for a late global.
//!
//! Browsers are reached only through the traits in [`handle`]. The
//! `clicktrace-drivers` crate implements them over WebDriver; the `testing`
//! feature provides an in-memory implementation. Pages and browsers opened
//! by the pipeline are held in a [`scoped::Scoped`] guard.
pub mod frame;
pub mod handle;
pub mod orchestrator;
pub mod pattern;
pub mod scoped;
pub mod scripts;
pub mod strategy;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use frame::FrameExtractor;
pub use handle::{BrowserHandle, BrowserLauncher, Closable, FrameHandle, PageHandle};
pub use orchestrator::PageOrchestrator;
pub use scoped::Scoped;
pub use strategy::Strategy;
pub use types::{DetailRecord, ExtractionResult, Found, Source};
