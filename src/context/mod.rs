//! Prompt assembly within a token budget.

mod builder;
mod knowledge;
mod message;
pub mod tokens;

pub use builder::{trim_history, ContextBuilder, DEFAULT_INSTRUCTIONS};
pub use knowledge::{KnowledgeBase, Section};
pub use message::{Message, Role};
pub use tokens::estimate_tokens;
