//! # Service Layer
//!
//! Business logic between the HTTP/WebSocket edges and the repositories.
//!
//! | Service | Responsibility |
//! |---------|---------------|
//! | [`token_service::TokenService`] | Access/refresh/reset token lifecycle |
//! | [`auth_service::AuthService`] | Signup, login, logout, password reset |
//! | [`chat_service::ChatService`] | Conversation/group queries for REST |
//! | [`mailer`] | Outgoing-mail interface (delivery is external) |

pub mod auth_service;
pub mod chat_service;
pub mod mailer;
pub mod token_service;

pub use auth_service::AuthService;
pub use chat_service::ChatService;
pub use token_service::TokenService;
