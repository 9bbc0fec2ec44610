//! Users and sessions.

pub mod login;
pub mod session;

pub use login::{login, register, validate_user_id, UserRecord, MIN_PASSWORD_LEN};
pub use session::{MemorySessionStore, Session, SessionStore, SessionToken};
