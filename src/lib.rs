//! usergate - users, roles and permissions with password login
//!
//! Records live in an LMDB environment owned by a [`Store`]. An
//! [`Authenticator`] checks a login key and password against it and yields
//! the caller's [`Principal`]; sessions are opaque tokens stored hashed.
//!
//! ```no_run
//! use std::sync::Arc;
//! use usergate::{Argon2Hasher, AuthOutcome, Authenticator, Store};
//!
//! let store = Arc::new(Store::open("./data/usergate.mdb")?);
//! let auth = Authenticator::new(store.clone(), Argon2Hasher::new());
//! if let AuthOutcome::Authorized(p) = auth.authenticate("pjpires@gmail.com", "123qwe")? {
//!     let token = store.create_session(p.user.id, Some(1800))?;
//!     println!("{} logged in: {}", p.user.name, token);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod authenticator;
pub mod bootstrap;
pub mod constants;
pub mod credentials;
pub mod db;
pub mod error;
pub mod hasher;
pub mod model;
pub mod read;
pub mod session;
pub mod tx;
pub mod write;

#[cfg(feature = "server")]
pub mod config;
#[cfg(feature = "server")]
pub mod server;

pub use authenticator::{AuthOutcome, Authenticator, LookupFailure, UnauthorizedReason};
pub use bootstrap::{bootstrap_admin, is_bootstrapped};
pub use credentials::{resolve_principal, CredentialStore};
pub use db::{Store, StoreOptions};
pub use error::{Error, Result};
pub use hasher::{Argon2Hasher, PasswordHasher};
pub use model::{NewUser, Permission, Principal, Role, User};
pub use session::{generate_token, Session};
pub use tx::Tx;
