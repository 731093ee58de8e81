//! Core pipeline orchestration for ohpm-atlas.
//!
//! Ties the registry client, normalizer, categorizer, and catalog store into
//! the end-to-end crawl run.

pub mod pipeline;

pub use pipeline::{
    CrawlRunConfig, CrawlRunSummary, ProgressReporter, SilentProgress, run_crawl,
};
