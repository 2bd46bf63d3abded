//! # Repository Layer
//!
//! Database access for the durable log. Each repository owns a `PgPool`
//! clone (cheap - the pool is `Arc`-based) and exposes async methods with
//! parameterized queries only.

pub mod group_repository;
pub mod message_repository;
pub mod user_repository;

pub use group_repository::GroupRepository;
pub use message_repository::MessageRepository;
pub use user_repository::UserRepository;
