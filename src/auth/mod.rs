//! Authentication and session management

pub mod audit;
pub mod cookie;
pub mod guard;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod session;

pub use audit::{AuditLog, StoreAuditLog};
pub use guard::{authorize, require_admin};
pub use jwt::{extract_bearer, issue_refresh_token, Claims, JwtTokenService, TokenService};
pub use middleware::{authenticate, require_auth, TrustedProxies};
pub use models::{AuthContext, ClientInfo, User, UserInfo, UserRole};
pub use password::{check_strength, PasswordService, StrengthReport};
pub use session::SessionService;
