//! Authentication: register, login, logout, session validation.

mod handlers;
mod password;

pub use handlers::{login, logout, register, session, SESSION_COOKIE};
pub use password::PasswordService;
