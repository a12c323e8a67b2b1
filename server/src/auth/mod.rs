//! Bearer credentials for the document endpoints.

mod middleware;

pub use middleware::AuthUser;
