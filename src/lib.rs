//! Scheduled publish & notification pipeline for a content site.
//!
//! A run moves a bounded batch of draft records to `published` in one
//! atomic store write, then asks the site to revalidate each page and,
//! when a credential is configured, tells the search index about it.

pub mod auth;
pub mod config;
pub mod db;
pub mod indexing;
pub mod model;
pub mod pacing;
pub mod pipeline;
pub mod revalidate;
pub mod server;

pub use pipeline::{Pipeline, PipelineError};
