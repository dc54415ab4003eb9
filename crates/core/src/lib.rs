//! # BlueChat Core
//!
//! Domain types, traits, and error definitions for the BlueChat gateway.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam with more than one implementation (today: the generation
//! backend) is a trait here. Implementations live in their respective crates,
//! so the gateway can be wired with a hosted API, a local model, or a test
//! stub without changing the request pipeline.

pub mod backend;
pub mod error;
pub mod knowledge;
pub mod message;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, RAG_SOURCE};
pub use error::{BackendError, GatewayError, KnowledgeError, Result};
pub use knowledge::{KnowledgeEntry, Retrieval};
pub use message::{Conversation, Message, Role};
