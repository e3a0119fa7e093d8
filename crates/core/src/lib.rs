pub mod config;
pub mod domain;
pub mod errors;
pub mod knowledge;
pub mod text;

pub use domain::intent::Intent;
pub use domain::product::ProductName;
pub use domain::session::{Session, SessionId, Speaker, Turn};
pub use errors::{ApplicationError, DomainError, InterfaceError};
