//! Transaction wrapper for administrative writes

use heed::RwTxn;

use crate::constants::META_NEXT_ID;
use crate::db::{now_millis, Dbs, Store};
use crate::error::{Error, Result};
use crate::model::{Permission, Role, User};

/// One LMDB write transaction. Every check-then-insert runs inside it, so
/// uniqueness checks cannot race with a concurrent writer.
pub struct Tx<'s> {
    txn: RwTxn<'s>,
    dbs: &'s Dbs,
}

impl<'s> Tx<'s> {
    #[inline]
    pub(crate) fn tx(&mut self) -> &mut RwTxn<'s> {
        &mut self.txn
    }

    #[inline]
    pub(crate) fn dbs(&self) -> &'s Dbs {
        self.dbs
    }

    #[inline]
    fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Create a permission; its name must be unused
    pub fn create_permission(&mut self, name: &str) -> Result<Permission> {
        let d = self.dbs;
        if d.permission_names.get(self.tx(), name)?.is_some() {
            return Err(Error::Conflict(format!("permission '{}'", name)));
        }
        let id = self.next_id()?;
        let permission = Permission { id, name: name.to_string() };
        d.permissions.put(self.tx(), &id, &permission)?;
        d.permission_names.put(self.tx(), name, &id)?;
        Ok(permission)
    }

    pub fn find_permission_id(&mut self, name: &str) -> Result<Option<u64>> {
        let d = self.dbs;
        Ok(d.permission_names.get(self.tx(), name)?)
    }

    /// Delete a permission and detach it from every role
    pub fn delete_permission(&mut self, id: u64) -> Result<bool> {
        let d = self.dbs;
        let Some(permission) = d.permissions.get(self.tx(), &id)? else {
            return Ok(false);
        };
        d.permission_names.delete(self.tx(), &permission.name)?;
        d.role_permissions.del_rev_all(self.tx(), id)?;
        d.permissions.delete(self.tx(), &id)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Create a role holding `permissions`; its name must be unused
    pub fn create_role(&mut self, name: &str, permissions: &[u64]) -> Result<Role> {
        let d = self.dbs;
        if d.role_names.get(self.tx(), name)?.is_some() {
            return Err(Error::Conflict(format!("role '{}'", name)));
        }
        let id = self.next_id()?;
        let role = Role { id, name: name.to_string() };
        d.roles.put(self.tx(), &id, &role)?;
        d.role_names.put(self.tx(), name, &id)?;
        for &permission in permissions {
            self.grant_permission(id, permission)?;
        }
        Ok(role)
    }

    pub fn find_role_id(&mut self, name: &str) -> Result<Option<u64>> {
        let d = self.dbs;
        Ok(d.role_names.get(self.tx(), name)?)
    }

    /// Add a permission to a role (idempotent)
    pub fn grant_permission(&mut self, role: u64, permission: u64) -> Result<()> {
        self.require_role(role)?;
        self.require_permission(permission)?;
        let d = self.dbs;
        if d.role_permissions.contains(self.tx(), role, permission)? {
            return Ok(());
        }
        d.role_permissions.put(self.tx(), role, permission, now_millis())
    }

    pub fn revoke_permission(&mut self, role: u64, permission: u64) -> Result<bool> {
        let d = self.dbs;
        d.role_permissions.del(self.tx(), role, permission)
    }

    /// Delete a role, detaching it from users and permissions
    pub fn delete_role(&mut self, id: u64) -> Result<bool> {
        let d = self.dbs;
        let Some(role) = d.roles.get(self.tx(), &id)? else {
            return Ok(false);
        };
        d.role_names.delete(self.tx(), &role.name)?;
        d.user_roles.del_rev_all(self.tx(), id)?;
        d.role_permissions.del_fwd_all(self.tx(), id)?;
        d.roles.delete(self.tx(), &id)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert a user; `email` must be unused and every role must exist
    pub fn create_user(
        &mut self,
        name: &str,
        email: &str,
        password_hash: &str,
        active: bool,
        roles: &[u64],
    ) -> Result<User> {
        let d = self.dbs;
        if d.user_emails.get(self.tx(), email)?.is_some() {
            return Err(Error::Conflict(format!("user '{}'", email)));
        }
        for &role in roles {
            self.require_role(role)?;
        }
        let id = self.next_id()?;
        let user = User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            active,
            created: now_millis(),
        };
        d.users.put(self.tx(), &id, &user)?;
        d.user_emails.put(self.tx(), email, &id)?;
        for &role in roles {
            d.user_roles.put(self.tx(), id, role, user.created)?;
        }
        Ok(user)
    }

    /// Add a role to a user (idempotent)
    pub fn assign_role(&mut self, user: u64, role: u64) -> Result<()> {
        self.require_user(user)?;
        self.require_role(role)?;
        let d = self.dbs;
        if d.user_roles.contains(self.tx(), user, role)? {
            return Ok(());
        }
        d.user_roles.put(self.tx(), user, role, now_millis())
    }

    pub fn unassign_role(&mut self, user: u64, role: u64) -> Result<bool> {
        let d = self.dbs;
        d.user_roles.del(self.tx(), user, role)
    }

    /// Flip the active flag. Deactivation also drops the user's sessions.
    pub fn set_active(&mut self, id: u64, active: bool) -> Result<User> {
        let mut user = self.require_user(id)?;
        user.active = active;
        let d = self.dbs;
        d.users.put(self.tx(), &id, &user)?;
        if !active {
            self.drop_sessions(id)?;
        }
        Ok(user)
    }

    pub fn set_password_hash(&mut self, id: u64, password_hash: &str) -> Result<()> {
        let mut user = self.require_user(id)?;
        user.password_hash = password_hash.to_string();
        let d = self.dbs;
        d.users.put(self.tx(), &id, &user)?;
        Ok(())
    }

    /// Delete a user with its role memberships and sessions
    pub fn delete_user(&mut self, id: u64) -> Result<bool> {
        let d = self.dbs;
        let Some(user) = d.users.get(self.tx(), &id)? else {
            return Ok(false);
        };
        d.user_emails.delete(self.tx(), &user.email)?;
        d.user_roles.del_fwd_all(self.tx(), id)?;
        self.drop_sessions(id)?;
        d.users.delete(self.tx(), &id)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Remove every session of a user, returning how many were dropped
    pub(crate) fn drop_sessions(&mut self, user: u64) -> Result<u64> {
        let d = self.dbs;
        let prefix = format!("{}/", user);
        let mut keys = Vec::new();
        for item in d.sessions_by_user.prefix_iter(self.tx(), &prefix)? {
            let (k, _) = item?;
            keys.push(k.to_string());
        }
        for k in &keys {
            d.sessions_by_user.delete(self.tx(), k)?;
            d.sessions.delete(self.tx(), &k[prefix.len()..])?;
        }
        Ok(keys.len() as u64)
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Wipe users, roles, permissions, associations and sessions
    pub fn clear_all(&mut self) -> Result<()> {
        let d = self.dbs;
        d.users.clear(self.tx())?;
        d.user_emails.clear(self.tx())?;
        d.roles.clear(self.tx())?;
        d.role_names.clear(self.tx())?;
        d.permissions.clear(self.tx())?;
        d.permission_names.clear(self.tx())?;
        d.user_roles.clear(self.tx())?;
        d.role_permissions.clear(self.tx())?;
        d.sessions.clear(self.tx())?;
        d.sessions_by_user.clear(self.tx())?;
        Ok(())
    }

    pub(crate) fn next_id(&mut self) -> Result<u64> {
        let d = self.dbs;
        let id = d
            .meta
            .get(self.tx(), META_NEXT_ID)?
            .and_then(|s| s.parse().ok())
            .unwrap_or(1u64);
        d.meta.put(self.tx(), META_NEXT_ID, &(id + 1).to_string())?;
        Ok(id)
    }

    fn require_user(&mut self, id: u64) -> Result<User> {
        let d = self.dbs;
        d.users
            .get(self.tx(), &id)?
            .ok_or_else(|| Error::NotFound(format!("user {}", id)))
    }

    fn require_role(&mut self, id: u64) -> Result<()> {
        let d = self.dbs;
        match d.roles.get(self.tx(), &id)? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("role {}", id))),
        }
    }

    fn require_permission(&mut self, id: u64) -> Result<()> {
        let d = self.dbs;
        match d.permissions.get(self.tx(), &id)? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("permission {}", id))),
        }
    }
}

impl Store {
    /// Run multiple operations in a single write transaction
    pub fn transact<T, F: FnOnce(&mut Tx<'_>) -> Result<T>>(&self, f: F) -> Result<T> {
        let (env, dbs) = self.parts();
        let mut tx = Tx { txn: env.write_txn()?, dbs };
        let r = f(&mut tx)?;
        tx.commit()?;
        Ok(r)
    }
}
