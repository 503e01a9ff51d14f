//! Business logic: user accounts and sessions.

pub mod sessions;
pub mod users;

pub use sessions::SessionsService;
pub use users::UsersService;
