//! Game catalog and session outcome types

pub mod types;

pub use types::*;
