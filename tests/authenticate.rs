//! Authenticator tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use usergate::{
    Argon2Hasher, AuthOutcome, Authenticator, CredentialStore, Error, NewUser, PasswordHasher,
    Permission, Role, Store, UnauthorizedReason, User,
};

const USER_NAME: &str = "Paulo Pires";
const USER_EMAIL: &str = "pjpires@gmail.com";
const USER_PWD: &str = "123qwe";

fn hasher() -> Argon2Hasher {
    Argon2Hasher::with_params(8, 1, 1).unwrap()
}

/// VIEW_USER_ROLES, ADMIN -> {VIEW_USER_ROLES}, one active admin user
fn setup() -> (TempDir, Arc<Store>, Authenticator<Arc<Store>, Argon2Hasher>) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(dir.path().join("auth.mdb")).unwrap());
    store.clear_all().unwrap();

    let p1 = store.create_permission("VIEW_USER_ROLES").unwrap();
    let admin = store.create_role("ADMIN", &[p1.id]).unwrap();
    store
        .register_user(
            &hasher(),
            &NewUser::new(USER_NAME, USER_EMAIL, USER_PWD).with_roles([admin.id]),
        )
        .unwrap();

    let auth = Authenticator::new(store.clone(), hasher());
    (dir, store, auth)
}

fn reason(outcome: AuthOutcome) -> UnauthorizedReason {
    outcome.reason().expect("expected Unauthorized")
}

// ============================================================================
// Scenario
// ============================================================================

#[test]
fn test_count() {
    let (_dir, store, _) = setup();
    assert_eq!(store.count_users().unwrap(), 1);
}

#[test]
fn test_authenticate_success() {
    let (_dir, _store, auth) = setup();

    let outcome = auth.authenticate(USER_EMAIL, USER_PWD).unwrap();
    let principal = outcome.principal().expect("authorized");
    assert_eq!(principal.user.email, USER_EMAIL);
    assert_eq!(principal.user.name, USER_NAME);
    assert!(principal.has_role("ADMIN"));
    assert!(principal.is_permitted("VIEW_USER_ROLES"));
    assert!(!principal.is_permitted("DELETE_USERS"));
}

#[test]
fn test_authenticate_failure() {
    let (_dir, _store, auth) = setup();

    let outcome = auth.authenticate(USER_EMAIL, "wrong password").unwrap();
    assert_eq!(reason(outcome), UnauthorizedReason::BadCredential);
}

// ============================================================================
// Outcomes
// ============================================================================

#[test]
fn test_unknown_principal() {
    let (_dir, _store, auth) = setup();

    let outcome = auth.authenticate("nobody@example.com", USER_PWD).unwrap();
    assert_eq!(reason(outcome), UnauthorizedReason::UnknownPrincipal);
}

#[test]
fn test_login_key_is_exact_match() {
    let (_dir, _store, auth) = setup();

    let outcome = auth.authenticate("PJPIRES@gmail.com", USER_PWD).unwrap();
    assert_eq!(reason(outcome), UnauthorizedReason::UnknownPrincipal);
}

#[test]
fn test_inactive_account_with_correct_password() {
    let (_dir, store, auth) = setup();
    let user = store.find_user_by_email(USER_EMAIL).unwrap().unwrap();
    store.set_active(user.id, false).unwrap();

    let outcome = auth.authenticate(USER_EMAIL, USER_PWD).unwrap();
    assert_eq!(reason(outcome), UnauthorizedReason::InactiveAccount);
}

#[test]
fn test_inactive_account_with_wrong_password_is_bad_credential() {
    let (_dir, store, auth) = setup();
    let user = store.find_user_by_email(USER_EMAIL).unwrap().unwrap();
    store.set_active(user.id, false).unwrap();

    let outcome = auth.authenticate(USER_EMAIL, "wrong password").unwrap();
    assert_eq!(reason(outcome), UnauthorizedReason::BadCredential);
}

#[test]
fn test_every_registered_user_authorizes() {
    let (_dir, store, auth) = setup();
    let h = hasher();
    for i in 0..5 {
        let email = format!("user{}@example.com", i);
        let pwd = format!("pw-{}", i);
        store.register_user(&h, &NewUser::new("U", email.clone(), pwd.clone())).unwrap();

        let outcome = auth.authenticate(&email, &pwd).unwrap();
        assert!(outcome.is_authorized());
        let principal = outcome.principal().unwrap();
        assert_eq!(principal.user.email, email);
        assert!(principal.roles.is_empty());
    }
}

#[test]
fn test_permissions_are_deduplicated_across_roles() {
    let (_dir, store, auth) = setup();
    let view = store.find_permission_by_name("VIEW_USER_ROLES").unwrap().unwrap();
    let auditor = store.create_role("AUDITOR", &[view.id]).unwrap();
    let user = store.find_user_by_email(USER_EMAIL).unwrap().unwrap();
    store.assign_role(user.id, auditor.id).unwrap();

    let outcome = auth.authenticate(USER_EMAIL, USER_PWD).unwrap();
    let principal = outcome.principal().unwrap();
    assert_eq!(principal.roles.len(), 2);
    assert_eq!(principal.permission_names(), vec!["VIEW_USER_ROLES"]);
}

#[test]
fn test_authenticate_is_idempotent() {
    let (_dir, _store, auth) = setup();

    let a = auth.authenticate(USER_EMAIL, USER_PWD).unwrap();
    let b = auth.authenticate(USER_EMAIL, USER_PWD).unwrap();
    assert_eq!(a, b);

    let c = auth.authenticate(USER_EMAIL, "nope").unwrap();
    let d = auth.authenticate(USER_EMAIL, "nope").unwrap();
    assert_eq!(c, d);
}

#[test]
fn test_authenticate_does_not_write() {
    let (_dir, store, auth) = setup();
    let before = store.list_users().unwrap();

    auth.authenticate(USER_EMAIL, USER_PWD).unwrap();
    auth.authenticate(USER_EMAIL, "wrong").unwrap();
    auth.authenticate("ghost@example.com", "x").unwrap();

    assert_eq!(store.list_users().unwrap(), before);
    let user = store.find_user_by_email(USER_EMAIL).unwrap().unwrap();
    assert!(store.list_sessions(user.id).unwrap().is_empty());
}

#[test]
fn test_concurrent_authentication() {
    let (_dir, _store, auth) = setup();
    let auth = Arc::new(auth);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let auth = auth.clone();
            std::thread::spawn(move || {
                let pwd = if i % 2 == 0 { USER_PWD } else { "wrong password" };
                auth.authenticate(USER_EMAIL, pwd).unwrap().is_authorized()
            })
        })
        .collect();

    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (i, ok) in results.into_iter().enumerate() {
        assert_eq!(ok, i % 2 == 0);
    }
}

// ============================================================================
// Lookup Failures
// ============================================================================

/// Store double whose lookups fail, or which returns a canned user
struct FaultyStore {
    user: Option<User>,
    lookups: AtomicUsize,
}

impl CredentialStore for FaultyStore {
    fn find_user_by_login_key(&self, _key: &str) -> usergate::Result<Option<User>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match &self.user {
            Some(u) => Ok(Some(u.clone())),
            None => Err(Error::Unavailable("connection refused".into())),
        }
    }

    fn find_role_by_id(&self, _id: u64) -> usergate::Result<Option<Role>> {
        Err(Error::Unavailable("connection refused".into()))
    }

    fn find_permission_by_id(&self, _id: u64) -> usergate::Result<Option<Permission>> {
        Ok(None)
    }

    fn role_ids_for_user(&self, _user: u64) -> usergate::Result<Vec<u64>> {
        Ok(vec![1])
    }

    fn permission_ids_for_role(&self, _role: u64) -> usergate::Result<Vec<u64>> {
        Ok(Vec::new())
    }
}

fn canned_user(password_hash: String) -> User {
    User {
        id: 1,
        name: USER_NAME.into(),
        email: USER_EMAIL.into(),
        password_hash,
        active: true,
        created: 0,
    }
}

#[test]
fn test_store_fault_is_lookup_failure() {
    let store = FaultyStore { user: None, lookups: AtomicUsize::new(0) };
    let auth = Authenticator::new(store, hasher());

    let err = auth.authenticate(USER_EMAIL, USER_PWD).unwrap_err();
    assert!(matches!(err.cause, Error::Unavailable(_)));
    assert_eq!(auth.store().lookups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fault_while_resolving_roles_is_lookup_failure() {
    let digest = hasher().hash(USER_PWD).unwrap();
    let store = FaultyStore { user: Some(canned_user(digest)), lookups: AtomicUsize::new(0) };
    let auth = Authenticator::new(store, hasher());

    assert!(auth.authenticate(USER_EMAIL, USER_PWD).is_err());
    // A wrong password never reaches role resolution
    let outcome = auth.authenticate(USER_EMAIL, "wrong password").unwrap();
    assert_eq!(reason(outcome), UnauthorizedReason::BadCredential);
}

#[test]
fn test_corrupt_digest_is_lookup_failure() {
    let store = FaultyStore {
        user: Some(canned_user("plaintext-oops".into())),
        lookups: AtomicUsize::new(0),
    };
    let auth = Authenticator::new(store, hasher());

    let err = auth.authenticate(USER_EMAIL, "plaintext-oops").unwrap_err();
    assert!(matches!(err.cause, Error::Hash(_)));
}
