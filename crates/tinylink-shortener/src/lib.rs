//! URL shortener service implementation.
//!
//! This crate provides [`ShortenerService`], the [`Shortener`] implementation
//! backed by the multi-tier [`Storage`] coordinator. Core types are
//! re-exported from `tinylink_core`.
//!
//! [`Storage`]: tinylink_storage::Storage

pub mod service;

pub use service::ShortenerService;
pub use tinylink_core::{BatchItem, Shortened, Shortener, ShortenerError};
