//! HTTP surface for the chat pipeline.

mod server;
mod service;

pub use server::ApiServer;
pub use service::{client_id, router, ChatPayload};
