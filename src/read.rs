//! Read operations (direct LMDB access, one read transaction each)

use heed::RoTxn;

use crate::db::{Dbs, Store};
use crate::error::Result;
use crate::model::{Permission, Role, User};

#[inline]
pub(crate) fn user_by_email(d: &Dbs, tx: &RoTxn, email: &str) -> Result<Option<User>> {
    match d.user_emails.get(tx, email)? {
        Some(id) => Ok(d.users.get(tx, &id)?),
        None => Ok(None),
    }
}

impl Store {
    /// Exact, case-sensitive lookup by login key (email)
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.read(|d, tx| user_by_email(d, tx, email))
    }

    pub fn get_user(&self, id: u64) -> Result<Option<User>> {
        self.read(|d, tx| Ok(d.users.get(tx, &id)?))
    }

    /// All users in id order
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.users.iter(tx)? {
                let (_, user) = item?;
                r.push(user);
            }
            Ok(r)
        })
    }

    pub fn count_users(&self) -> Result<u64> {
        self.read(|d, tx| Ok(d.users.len(tx)?))
    }

    pub fn get_role(&self, id: u64) -> Result<Option<Role>> {
        self.read(|d, tx| Ok(d.roles.get(tx, &id)?))
    }

    pub fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.read(|d, tx| match d.role_names.get(tx, name)? {
            Some(id) => Ok(d.roles.get(tx, &id)?),
            None => Ok(None),
        })
    }

    pub fn list_roles(&self) -> Result<Vec<Role>> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.roles.iter(tx)? {
                let (_, role) = item?;
                r.push(role);
            }
            Ok(r)
        })
    }

    pub fn get_permission(&self, id: u64) -> Result<Option<Permission>> {
        self.read(|d, tx| Ok(d.permissions.get(tx, &id)?))
    }

    pub fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        self.read(|d, tx| match d.permission_names.get(tx, name)? {
            Some(id) => Ok(d.permissions.get(tx, &id)?),
            None => Ok(None),
        })
    }

    pub fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.permissions.iter(tx)? {
                let (_, permission) = item?;
                r.push(permission);
            }
            Ok(r)
        })
    }

    /// Role ids held by a user
    pub fn roles_of_user(&self, user: u64) -> Result<Vec<u64>> {
        self.read(|d, tx| d.user_roles.list_fwd(tx, user))
    }

    /// Permission ids granted to a role
    pub fn permissions_of_role(&self, role: u64) -> Result<Vec<u64>> {
        self.read(|d, tx| d.role_permissions.list_fwd(tx, role))
    }

    /// Users holding a role
    pub fn users_with_role(&self, role: u64) -> Result<Vec<User>> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for id in d.user_roles.list_rev(tx, role)? {
                if let Some(user) = d.users.get(tx, &id)? {
                    r.push(user);
                }
            }
            Ok(r)
        })
    }

    /// Roles of a user paired with the permissions each grants
    pub fn roles_with_permissions(&self, user: u64) -> Result<Vec<(Role, Vec<Permission>)>> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for role_id in d.user_roles.list_fwd(tx, user)? {
                let Some(role) = d.roles.get(tx, &role_id)? else { continue };
                let mut permissions = Vec::new();
                for pid in d.role_permissions.list_fwd(tx, role_id)? {
                    if let Some(p) = d.permissions.get(tx, &pid)? {
                        permissions.push(p);
                    }
                }
                r.push((role, permissions));
            }
            Ok(r)
        })
    }
}
