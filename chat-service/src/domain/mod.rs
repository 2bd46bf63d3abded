//! # Domain Layer
//!
//! Core domain models for the chat service. Entities mirror the durable
//! log's tables (`sqlx::FromRow`); the `New*` structs carry insert data.

pub mod entities;

pub use entities::*;
