//! Abstract syntax tree for evaluated scripts.
//!
//! The tree is immutable once parsed: the tail rewriter builds new nodes
//! rather than patching old ones, and function bodies are shared behind
//! `Arc` so closures can hold on to them cheaply.

mod types;

pub use types::*;
