//! # Bid Audit Common Library
//!
//! Shared code for the bid audit service:
//! - Database schema, row models and status enums
//! - Agent answer normalization (alias tables, not-found phrases)
//! - Field and document-type catalog
//! - API response envelope
//! - Configuration loading
//! - Retry policy and local key/value persistence

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod kv_store;
pub mod normalizer;
pub mod retry;

pub use error::{Error, Result};
