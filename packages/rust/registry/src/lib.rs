//! Registry client and record normalizer.
//!
//! This crate provides:
//! - [`client`] — Concurrent, rate-limited fetcher for the paginated OHPM
//!   registry search API
//! - [`normalize`] — Coercion of loosely-typed raw rows into canonical
//!   [`Package`](ohpmatlas_shared::Package) records

pub mod client;
pub mod normalize;

pub use client::{FetchOutcome, RegistryClient};
pub use normalize::{NormalizeOutcome, RawEntry, RejectReason, normalize, normalize_all};
