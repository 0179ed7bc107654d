//! Core domain types shared across the SENTINEL advisor crates.
//!
//! This crate is dependency-light on purpose: conversation turns, intent
//! annotations, persona definitions, and the refresh-if-stale cache cell.
//! Anything that talks to the network or a database lives in the crates
//! that own those concerns.

pub mod cache;
pub mod conversation;
pub mod intent;
pub mod persona;

pub use cache::CacheCell;
pub use conversation::{Channel, Turn, TurnRole};
pub use intent::{Classification, ClassificationSource, IntentCategory, Sentiment};
pub use persona::{AgentPersona, DataScopes};
