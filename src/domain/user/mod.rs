//! User records: model, persistence and service.

pub mod model;
pub mod repository;
pub mod service;

pub use model::{normalize_email, CreateUserRequest, User, UserError};
pub use service::UserService;
