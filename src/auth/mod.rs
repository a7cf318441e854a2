pub mod jwt;
pub mod password;
pub mod session;

pub use jwt::{Claims, JwtKeys};
pub use session::AuthUser;
