//! First-run seeding of the administrator account

use tracing::info;

use crate::constants::{PERMISSION_VIEW_USER_ROLES, ROLE_ADMIN};
use crate::db::Store;
use crate::error::Result;
use crate::hasher::PasswordHasher;
use crate::model::User;

/// True once any user exists
pub fn is_bootstrapped(store: &Store) -> Result<bool> {
    Ok(store.count_users()? > 0)
}

/// Seed `VIEW_USER_ROLES`, `ADMIN -> {VIEW_USER_ROLES}` and an active
/// administrator holding `ADMIN`. Returns `None` when the store already
/// has users. Existing role/permission rows with the seeded names are reused.
pub fn bootstrap_admin<H: PasswordHasher + ?Sized>(
    store: &Store,
    hasher: &H,
    name: &str,
    email: &str,
    password: &str,
) -> Result<Option<User>> {
    if is_bootstrapped(store)? {
        return Ok(None);
    }
    let digest = hasher.hash(password)?;
    let admin = store.transact(|tx| {
        // Re-check inside the writer: another process may have seeded meanwhile
        if tx.dbs().users.len(tx.tx())? > 0 {
            return Ok(None);
        }
        let view = match tx.find_permission_id(PERMISSION_VIEW_USER_ROLES)? {
            Some(id) => id,
            None => tx.create_permission(PERMISSION_VIEW_USER_ROLES)?.id,
        };
        let admin_role = match tx.find_role_id(ROLE_ADMIN)? {
            Some(id) => {
                tx.grant_permission(id, view)?;
                id
            }
            None => tx.create_role(ROLE_ADMIN, &[view])?.id,
        };
        tx.create_user(name, email, &digest, true, &[admin_role]).map(Some)
    })?;
    if let Some(user) = &admin {
        info!(id = user.id, email, "administrator seeded");
    }
    Ok(admin)
}
