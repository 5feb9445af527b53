//! HTTP endpoint layer: the chat page, the chat turn route, and a health
//! endpoint, with per-IP rate limiting and a request body cap.

mod error;
mod handlers;
mod router;
mod server;

pub use error::GatewayError;
pub use server::{AppState, GatewayServer};
