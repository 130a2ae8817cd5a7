//! Administrative write API, one transaction per call

use tracing::info;

use crate::db::Store;
use crate::error::Result;
use crate::hasher::PasswordHasher;
use crate::model::{NewUser, Permission, Role, User};

impl Store {
    pub fn create_permission(&self, name: &str) -> Result<Permission> {
        let p = self.transact(|tx| tx.create_permission(name))?;
        info!(id = p.id, name, "permission created");
        Ok(p)
    }

    /// Create a role granting every permission in `permissions`
    pub fn create_role(&self, name: &str, permissions: &[u64]) -> Result<Role> {
        let r = self.transact(|tx| tx.create_role(name, permissions))?;
        info!(id = r.id, name, "role created");
        Ok(r)
    }

    pub fn grant_permission(&self, role: u64, permission: u64) -> Result<()> {
        self.transact(|tx| tx.grant_permission(role, permission))
    }

    pub fn revoke_permission(&self, role: u64, permission: u64) -> Result<bool> {
        self.transact(|tx| tx.revoke_permission(role, permission))
    }

    /// Insert a user whose password is already a digest
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        active: bool,
        roles: &[u64],
    ) -> Result<User> {
        let u = self.transact(|tx| tx.create_user(name, email, password_hash, active, roles))?;
        info!(id = u.id, email, "user created");
        Ok(u)
    }

    /// Hash the plaintext password, then insert. Hashing happens before the
    /// write transaction opens so the single writer is never held for it.
    pub fn register_user<H: PasswordHasher + ?Sized>(&self, hasher: &H, new: &NewUser) -> Result<User> {
        let digest = hasher.hash(&new.password)?;
        self.create_user(&new.name, &new.email, &digest, new.active, &new.roles)
    }

    pub fn assign_role(&self, user: u64, role: u64) -> Result<()> {
        self.transact(|tx| tx.assign_role(user, role))
    }

    pub fn unassign_role(&self, user: u64, role: u64) -> Result<bool> {
        self.transact(|tx| tx.unassign_role(user, role))
    }

    /// Enable or disable a user; disabling revokes every session it holds
    pub fn set_active(&self, user: u64, active: bool) -> Result<User> {
        let u = self.transact(|tx| tx.set_active(user, active))?;
        info!(id = user, active, "user activation changed");
        Ok(u)
    }

    pub fn set_password<H: PasswordHasher + ?Sized>(&self, hasher: &H, user: u64, password: &str) -> Result<()> {
        let digest = hasher.hash(password)?;
        self.transact(|tx| tx.set_password_hash(user, &digest))?;
        info!(id = user, "password changed");
        Ok(())
    }

    pub fn delete_user(&self, id: u64) -> Result<bool> {
        self.transact(|tx| tx.delete_user(id))
    }

    pub fn delete_role(&self, id: u64) -> Result<bool> {
        self.transact(|tx| tx.delete_role(id))
    }

    pub fn delete_permission(&self, id: u64) -> Result<bool> {
        self.transact(|tx| tx.delete_permission(id))
    }

    /// Remove every user, role, permission and session
    pub fn clear_all(&self) -> Result<()> {
        self.transact(|tx| tx.clear_all())?;
        info!("store cleared");
        Ok(())
    }
}
