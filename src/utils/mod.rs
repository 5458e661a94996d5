pub mod auth;
pub mod password;
pub mod upload;

pub use auth::{create_token, verify_token};
pub use password::{hash_password, verify_password};
pub use upload::{save_invoices, UploadedFile};
