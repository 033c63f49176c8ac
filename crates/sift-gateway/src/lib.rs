//! HTTP surface: `POST /query` into the workflow engine, `POST /ingest`
//! for collectors, `GET /health`. Optional bearer auth and body limits.

pub mod error;
mod handlers;
mod router;
pub mod server;

pub use error::GatewayError;
pub use server::GatewayServer;
