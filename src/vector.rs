//! Vector math used by the query executor.
//!
//! - `similarity`: SIMD cosine similarity and vector helpers

pub mod similarity;
