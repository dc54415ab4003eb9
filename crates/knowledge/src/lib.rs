//! Knowledge base for BlueChat.
//!
//! - **normalize**: case-fold and diacritic stripping for matching
//! - **store**: the read-only, in-memory knowledge document
//! - **retriever**: lexical best-match scoring over the store
//! - **import**: offline conversion of the Bluebook markdown into entries

pub mod import;
pub mod normalize;
pub mod retriever;
pub mod store;

pub use import::{SECTION_START_MARKER, parse_bluebook_markdown};
pub use normalize::normalize;
pub use retriever::{query_tokens, retrieve};
pub use store::KnowledgeStore;
