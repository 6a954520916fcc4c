//! Generic utility primitives with zero domain knowledge.
//!
//! - `parser` - Text extraction from command output
//! - `shell` - Shell escaping and quoting

pub mod parser;
pub mod shell;
