//! # TXdata Common Library
//!
//! Shared code for the TXdata research-data workbench:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Database initialization (schema)
//! - Tabular data model with CSV reading and writing
//! - Ordered maps (question maps, codebooks)

pub mod config;
pub mod db;
pub mod error;
pub mod frame;
pub mod ordered_map;

pub use error::{Error, Result};
pub use frame::{Cell, Column, Frame, Table};
pub use ordered_map::{OrderedMap, QuestionMap};
