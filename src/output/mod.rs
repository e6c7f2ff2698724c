//! Output module for run summaries, statistics and document sinks
//!
//! This module handles:
//! - Recording per-run crawl statistics
//! - Printing store statistics and the last run summary
//! - Writing a serialized copy of each stored document to a local tree or blob store

mod sink;
pub mod stats;
mod traits;

pub use sink::{build_sink, HttpBlobSink, LocalTreeSink};
pub use stats::{load_statistics, print_statistics, print_summary, CrawlStatistics};
pub use traits::{DocumentSink, RunSummary, SinkError, SinkResult};
