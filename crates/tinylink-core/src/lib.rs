//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the record model, the content-addressed identifier
//! deriver, and the repository and shortener contracts shared by the storage
//! tiers, the shortener service, and the HTTP gateway.

pub mod error;
pub mod hash;
pub mod owner;
pub mod repository;
pub mod shortener;

pub use error::{ShortenerError, StorageError};
pub use hash::{derive, Derived, UrlHash};
pub use owner::OwnerId;
pub use repository::{ReadRepository, Repository, SoftDeleteRepository, Stats, UrlRecord};
pub use shortener::{BatchItem, Shortened, Shortener};
