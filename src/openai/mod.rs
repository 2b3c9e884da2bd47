//! OpenAI-compatible wire types.

mod types;

pub use types::*;
