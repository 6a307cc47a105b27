pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, issue_token, verify_token};
pub use middleware::{AuthUser, OptionalAuth, RequireAuth};
