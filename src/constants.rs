//! Well-known names, storage sizing and session defaults

// Seeded by bootstrap and checked by the HTTP layer
pub const ROLE_ADMIN: &str = "ADMIN";
pub const PERMISSION_VIEW_USER_ROLES: &str = "VIEW_USER_ROLES";

// LMDB environment sizing
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;
pub const MAX_DBS: u32 = 16;

// Sessions
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_SESSION_PURGE_SECS: u64 = 5 * 60;
pub const SESSION_COOKIE: &str = "usergate_session";
pub const TOKEN_BYTES: usize = 32;
pub const SALT_BYTES: usize = 16;

// Meta keys
pub(crate) const META_NEXT_ID: &str = "next_id";
