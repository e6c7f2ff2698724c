//! State module for tracking crawl progress across runs
//!
//! # Components
//!
//! - `ResumeLog`: append-only JSON-lines record of every successful fetch
//! - `VisitedSet`: hashes of URLs already fetched, replayed from the resume log

mod resume_log;
mod visited;

pub use resume_log::{ResumeEntry, ResumeLog};
pub use visited::VisitedSet;
