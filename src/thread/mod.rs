//! Comment thread reconstruction
//!
//! Threads are fetched breadth-first (so each layer can be batched) and emitted
//! depth-first (so every comment is immediately followed by its replies).
//! Top-level comments have depth 0.

mod builder;
mod traversal;

pub use builder::CommentTreeBuilder;
pub use traversal::{FetchedComment, ThreadFetch, ThreadTraversal};
