//! HTTP API server

pub mod auth_routes;
pub mod extract;
pub mod rate_limit;
pub mod routes;
pub mod server;

pub use extract::ApiJson;
pub use routes::ApiResponse;
pub use server::*;
