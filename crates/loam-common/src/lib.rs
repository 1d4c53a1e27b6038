//! LoamDB common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all LoamDB components.

pub mod config;
pub mod error;
pub mod layout;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use layout::{PageNum, PageType, PAGE_SIZE};
