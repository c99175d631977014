//! # Memory Module
//!
//! Short-term conversation memory used to give the triage and interpreter
//! stages cross-turn context.
//!
//! ## Architecture
//!
//! ```text
//! user_id ──▶ VecDeque<Exchange>   (bounded by max_history)
//!                    ▲
//!      background sweep (max_age)
//! ```

pub mod conversation;

pub use conversation::{ConversationMemory, Exchange, MemoryConfig};
