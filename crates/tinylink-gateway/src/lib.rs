//! HTTP gateway for the tinylink shortener.
//!
//! Routes requests to a [`Shortener`](tinylink_core::Shortener), identifies
//! browsers through a signed owner cookie, and loads its configuration from
//! flags, environment variables, and an optional JSON file.

pub mod app;
pub mod config;
pub mod cookie;
pub mod error;
pub mod handlers;
pub mod model;
pub mod state;

pub use app::App;
pub use config::{Cli, Config};
pub use cookie::CookieSigner;
pub use state::AppState;
