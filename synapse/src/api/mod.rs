//! REST API Server for Synapse

pub mod server;
pub mod routes;
pub mod middleware;
pub mod error;

pub use error::ApiError;
pub use routes::{AppState, Envelope};
pub use server::{build_app, start_server};
