//! Shared library for PlayLocal Lambda functions.
//!
//! This crate provides the domain core plus common utilities, types, and
//! clients used across all Lambda functions.

pub mod auth;
pub mod blob;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fanout;
pub mod http;
pub mod ledger;
pub mod mailer;
pub mod models;
pub mod registry;
pub mod report;
pub mod search;
pub mod store;

pub use auth::{assert_owner, extract_identity, Identity};
pub use config::Config;
pub use error::{Error, Result};
pub use http::ApiResponse;
pub use models::{Appointment, Notification, Program};
pub use store::{DocumentStore, DynamoStore, MemoryStore, WriteOp};
