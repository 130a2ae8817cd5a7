//! Read-only lookup surface consumed by the authenticator

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::db::Store;
use crate::error::Result;
use crate::model::{Permission, Principal, Role, User};

/// The lookups authentication needs. Implemented by `Store`; test doubles
/// implement it to inject faults.
pub trait CredentialStore: Send + Sync {
    /// Exact, case-sensitive match on the login key (email)
    fn find_user_by_login_key(&self, key: &str) -> Result<Option<User>>;
    fn find_role_by_id(&self, id: u64) -> Result<Option<Role>>;
    fn find_permission_by_id(&self, id: u64) -> Result<Option<Permission>>;
    fn role_ids_for_user(&self, user: u64) -> Result<Vec<u64>>;
    fn permission_ids_for_role(&self, role: u64) -> Result<Vec<u64>>;
}

impl CredentialStore for Store {
    fn find_user_by_login_key(&self, key: &str) -> Result<Option<User>> {
        self.find_user_by_email(key)
    }

    fn find_role_by_id(&self, id: u64) -> Result<Option<Role>> {
        self.get_role(id)
    }

    fn find_permission_by_id(&self, id: u64) -> Result<Option<Permission>> {
        self.get_permission(id)
    }

    fn role_ids_for_user(&self, user: u64) -> Result<Vec<u64>> {
        self.roles_of_user(user)
    }

    fn permission_ids_for_role(&self, role: u64) -> Result<Vec<u64>> {
        self.permissions_of_role(role)
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn find_user_by_login_key(&self, key: &str) -> Result<Option<User>> {
        (**self).find_user_by_login_key(key)
    }

    fn find_role_by_id(&self, id: u64) -> Result<Option<Role>> {
        (**self).find_role_by_id(id)
    }

    fn find_permission_by_id(&self, id: u64) -> Result<Option<Permission>> {
        (**self).find_permission_by_id(id)
    }

    fn role_ids_for_user(&self, user: u64) -> Result<Vec<u64>> {
        (**self).role_ids_for_user(user)
    }

    fn permission_ids_for_role(&self, role: u64) -> Result<Vec<u64>> {
        (**self).permission_ids_for_role(role)
    }
}

/// Expand a user into its principal: distinct roles, then the distinct
/// permissions those roles grant. Dangling ids are skipped with a warning.
pub fn resolve_principal<S: CredentialStore + ?Sized>(store: &S, user: User) -> Result<Principal> {
    let role_ids: BTreeSet<u64> = store.role_ids_for_user(user.id)?.into_iter().collect();

    let mut roles = Vec::with_capacity(role_ids.len());
    let mut permission_ids = BTreeSet::new();
    for id in role_ids {
        match store.find_role_by_id(id)? {
            Some(role) => {
                permission_ids.extend(store.permission_ids_for_role(role.id)?);
                roles.push(role);
            }
            None => warn!(user = user.id, role = id, "dangling role reference"),
        }
    }

    let mut permissions = Vec::with_capacity(permission_ids.len());
    for id in permission_ids {
        match store.find_permission_by_id(id)? {
            Some(p) => permissions.push(p),
            None => warn!(permission = id, "dangling permission reference"),
        }
    }

    Ok(Principal { user, roles, permissions })
}
