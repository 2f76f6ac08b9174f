//! # tagging-core
//!
//! Core types, traits, and engine for generic tagging.
//!
//! This crate provides the tag string grammar, the [`Tagging`] engine
//! facade, the storage traits that backends implement, an in-memory
//! backend, and tag cloud calculation. The PostgreSQL backend lives in
//! `tagging-db`.

pub mod cloud;
pub mod config;
pub mod defaults;
pub mod error;
pub mod field;
pub mod logging;
pub mod memory;
pub mod models;
pub mod parser;
pub mod service;
pub mod traits;

// Re-export commonly used types at crate root
pub use cloud::{calculate_cloud, font_sizes, CloudTag, Distribution};
pub use config::TaggingConfig;
pub use error::{Error, Result};
pub use field::TaggedEntity;
pub use memory::MemoryTagStore;
pub use models::*;
pub use parser::{parse_tag_input, parse_tag_input_with, render_tags, render_tags_with};
pub use service::Tagging;
pub use traits::*;
