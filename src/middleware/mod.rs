pub mod auth;

pub use auth::{get_current_user, CurrentUser};
