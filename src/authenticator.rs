//! Credential verification: lookup, verify, active check

use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::{debug, warn};

use crate::credentials::{resolve_principal, CredentialStore};
use crate::error::Error;
use crate::hasher::PasswordHasher;
use crate::model::Principal;

/// Why an attempt was rejected. Never shown to the caller beyond a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    UnknownPrincipal,
    BadCredential,
    InactiveAccount,
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownPrincipal => "unknown principal",
            Self::BadCredential => "bad credential",
            Self::InactiveAccount => "inactive account",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized(Principal),
    Unauthorized(UnauthorizedReason),
}

impl AuthOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authorized(p) => Some(p),
            Self::Unauthorized(_) => None,
        }
    }

    pub fn reason(&self) -> Option<UnauthorizedReason> {
        match self {
            Self::Authorized(_) => None,
            Self::Unauthorized(r) => Some(*r),
        }
    }
}

/// The credential store could not be consulted
#[derive(Debug, Error)]
#[error("credential lookup failed: {cause}")]
pub struct LookupFailure {
    #[from]
    pub cause: Error,
}

/// Decides whether a login key and password identify an active user.
pub struct Authenticator<S, H> {
    store: S,
    hasher: H,
    decoy: OnceLock<Option<String>>,
}

impl<S: CredentialStore, H: PasswordHasher> Authenticator<S, H> {
    pub fn new(store: S, hasher: H) -> Self {
        Self { store, hasher, decoy: OnceLock::new() }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// One pass, no retries, no writes.
    ///
    /// The password is checked before the active flag, so an inactive
    /// account is only reported to someone who knows its password.
    pub fn authenticate(&self, login_key: &str, password: &str) -> Result<AuthOutcome, LookupFailure> {
        let Some(user) = self.store.find_user_by_login_key(login_key)? else {
            self.burn_decoy(password);
            debug!(login_key, "authentication rejected: unknown principal");
            return Ok(AuthOutcome::Unauthorized(UnauthorizedReason::UnknownPrincipal));
        };

        if !self.hasher.verify(password, &user.password_hash)? {
            debug!(user = user.id, "authentication rejected: bad credential");
            return Ok(AuthOutcome::Unauthorized(UnauthorizedReason::BadCredential));
        }

        if !user.active {
            debug!(user = user.id, "authentication rejected: inactive account");
            return Ok(AuthOutcome::Unauthorized(UnauthorizedReason::InactiveAccount));
        }

        let principal = resolve_principal(&self.store, user)?;
        debug!(
            user = principal.user.id,
            roles = principal.roles.len(),
            permissions = principal.permissions.len(),
            "authentication succeeded"
        );
        Ok(AuthOutcome::Authorized(principal))
    }

    // Spend one verification on a throwaway digest so an unknown login key
    // costs the same as a wrong password.
    fn burn_decoy(&self, password: &str) {
        let decoy = self.decoy.get_or_init(|| match self.hasher.hash("usergate-decoy") {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "decoy digest unavailable");
                None
            }
        });
        if let Some(d) = decoy {
            let _ = self.hasher.verify(password, d);
        }
    }
}
