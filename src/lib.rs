//! Concierge - chat assistant request pipeline
//!
//! This crate implements the backend behind a portfolio website's chat
//! assistant. Each visitor message is sanitized and screened, rate limited per
//! client, packed into a token-bounded prompt with the site's knowledge base,
//! and sent to an OpenAI-compatible provider that fails over across several
//! API credentials.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod guardrail;
pub mod pipeline;
pub mod provider;
