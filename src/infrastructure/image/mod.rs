//! Image handling infrastructure.
//!
//! This module provides:
//! - HTTP byte retrieval, inline or deferred
//! - Decoding with allocation limits and downscaling

pub mod decoder;
pub mod http_fetcher;

pub use decoder::ImageDecoder;
pub use http_fetcher::HttpFetcher;
