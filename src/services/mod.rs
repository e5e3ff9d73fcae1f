pub mod ai;
pub mod index;
pub mod parser;
pub mod query;
mod rag_config;

pub use rag_config::*;
