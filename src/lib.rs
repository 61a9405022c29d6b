//! Fruitstand - fruit inventory API with session authentication
//!
//! This is the library interface for Fruitstand: the auth core, stores and
//! the axum router can be embedded or driven in-process by tests.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod fruits;
pub mod store;

pub use config::Config;
pub use error::Error;
