mod admin;
mod error_handler;
mod rate_limit;

pub use admin::{ADMIN_COOKIE, AdminIdentity, admin_auth, current_admin};
pub use error_handler::log_errors;
pub use rate_limit::{RateLimit, rate_limit};
