//! Token-based session management
//!
//! Tokens are 32 random bytes, base64url encoded. Only their SHA-256 is
//! stored, so a leaked database does not yield usable cookies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::constants::TOKEN_BYTES;
use crate::db::{now_millis, Store};
use crate::error::{entropy_err, Error, Result};

/// A stored session. Times are epoch millis; `expires_at == 0` never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: u64,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Session {
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }
}

/// Generate a cryptographically secure token (32 bytes, base64url encoded)
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut bytes).map_err(entropy_err)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash token with SHA-256 for storage
pub(crate) fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn index_key(user_id: u64, hash: &str) -> String {
    format!("{}/{}", user_id, hash)
}

impl Store {
    /// Create a session for an existing user, returning the raw token.
    /// `ttl_secs: None` creates a session that never expires.
    pub fn create_session(&self, user_id: u64, ttl_secs: Option<u64>) -> Result<String> {
        let token = generate_token()?;
        let hash = hash_token(&token);
        let now = now_millis();
        let session = Session {
            user_id,
            created_at: now,
            expires_at: ttl_secs.map(|t| now.saturating_add(t.saturating_mul(1000))).unwrap_or(0),
        };

        self.transact(|tx| {
            let d = tx.dbs();
            if d.users.get(tx.tx(), &user_id)?.is_none() {
                return Err(Error::NotFound(format!("user {}", user_id)));
            }
            d.sessions.put(tx.tx(), &hash, &session)?;
            d.sessions_by_user
                .put(tx.tx(), &index_key(user_id, &hash), &session.expires_at)?;
            Ok(())
        })?;

        debug!(user_id, expires_at = session.expires_at, "session created");
        Ok(token)
    }

    /// Look up a token. Unknown and expired tokens yield `None`.
    pub fn validate_session(&self, token: &str) -> Result<Option<Session>> {
        let hash = hash_token(token);
        let now = now_millis();
        self.read(|dbs, tx| {
            Ok(dbs
                .sessions
                .get(tx, &hash)?
                .filter(|s| !s.is_expired_at(now)))
        })
    }

    /// Revoke a session by token
    pub fn revoke_session(&self, token: &str) -> Result<bool> {
        let hash = hash_token(token);
        self.transact(|tx| {
            let d = tx.dbs();
            let Some(session) = d.sessions.get(tx.tx(), &hash)? else {
                return Ok(false);
            };
            d.sessions.delete(tx.tx(), &hash)?;
            d.sessions_by_user
                .delete(tx.tx(), &index_key(session.user_id, &hash))?;
            Ok(true)
        })
    }

    /// Live sessions of a user
    pub fn list_sessions(&self, user_id: u64) -> Result<Vec<Session>> {
        let prefix = format!("{}/", user_id);
        let now = now_millis();
        self.read(|dbs, tx| {
            let mut results = Vec::new();
            for item in dbs.sessions_by_user.prefix_iter(tx, &prefix)? {
                let (key, _) = item?;
                let hash = &key[prefix.len()..];
                if let Some(session) = dbs.sessions.get(tx, hash)? {
                    if !session.is_expired_at(now) {
                        results.push(session);
                    }
                }
            }
            Ok(results)
        })
    }

    /// Revoke all sessions for a user
    pub fn revoke_all_sessions(&self, user_id: u64) -> Result<u64> {
        self.transact(|tx| tx.drop_sessions(user_id))
    }

    /// Stored session rows, expired ones included until purged
    pub fn count_sessions(&self) -> Result<u64> {
        self.read(|dbs, tx| Ok(dbs.sessions.len(tx)?))
    }

    /// Delete every expired session, returning how many were removed
    pub fn purge_expired(&self) -> Result<u64> {
        let now = now_millis();
        let count = self.transact(|tx| {
            let d = tx.dbs();
            let mut expired = Vec::new();
            for item in d.sessions.iter(tx.tx())? {
                let (hash, session) = item?;
                if session.is_expired_at(now) {
                    expired.push((hash.to_string(), session.user_id));
                }
            }
            for (hash, user_id) in &expired {
                d.sessions.delete(tx.tx(), hash)?;
                d.sessions_by_user.delete(tx.tx(), &index_key(*user_id, hash))?;
            }
            Ok(expired.len() as u64)
        })?;
        if count > 0 {
            debug!(count, "expired sessions purged");
        }
        Ok(count)
    }
}
