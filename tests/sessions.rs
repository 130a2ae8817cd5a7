//! Session registry tests

use tempfile::TempDir;
use usergate::{generate_token, Error, Store};

fn setup() -> (TempDir, Store, u64) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("sessions.mdb")).unwrap();
    let user = store
        .create_user("Root", "root@example.com", "$argon2id$placeholder", true, &[])
        .unwrap();
    (dir, store, user.id)
}

// ============================================================================
// Token Generation
// ============================================================================

#[test]
fn test_generate_token_is_random() {
    let t1 = generate_token().unwrap();
    let t2 = generate_token().unwrap();
    assert_ne!(t1, t2);
    assert_eq!(t1.len(), 43); // 32 bytes, base64url without padding
}

#[test]
fn test_token_is_url_safe() {
    let token = generate_token().unwrap();
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

// ============================================================================
// Session CRUD
// ============================================================================

#[test]
fn test_create_and_validate_session() {
    let (_dir, store, user) = setup();

    let token = store.create_session(user, Some(60)).unwrap();
    let session = store.validate_session(&token).unwrap().unwrap();
    assert_eq!(session.user_id, user);
    assert!(session.expires_at > session.created_at);
}

#[test]
fn test_session_for_unknown_user_fails() {
    let (_dir, store, _) = setup();
    assert!(matches!(store.create_session(999, None), Err(Error::NotFound(_))));
}

#[test]
fn test_invalid_token_fails() {
    let (_dir, store, _) = setup();
    assert!(store.validate_session("invalid-token-here").unwrap().is_none());
}

#[test]
fn test_revoke_session() {
    let (_dir, store, user) = setup();

    let token = store.create_session(user, None).unwrap();
    assert!(store.validate_session(&token).unwrap().is_some());

    assert!(store.revoke_session(&token).unwrap());
    assert!(store.validate_session(&token).unwrap().is_none());
    assert!(store.list_sessions(user).unwrap().is_empty());
}

#[test]
fn test_revoke_nonexistent_session() {
    let (_dir, store, _) = setup();
    assert!(!store.revoke_session("nonexistent").unwrap());
}

#[test]
fn test_session_with_zero_ttl_expires() {
    let (_dir, store, user) = setup();

    let token = store.create_session(user, Some(0)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));
    assert!(store.validate_session(&token).unwrap().is_none());
    assert!(store.list_sessions(user).unwrap().is_empty());
}

#[test]
fn test_session_without_ttl_never_expires() {
    let (_dir, store, user) = setup();

    store.create_session(user, None).unwrap();
    let sessions = store.list_sessions(user).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].expires_at, 0);
}

#[test]
fn test_list_sessions() {
    let (_dir, store, user) = setup();

    store.create_session(user, None).unwrap();
    store.create_session(user, Some(60)).unwrap();

    assert_eq!(store.list_sessions(user).unwrap().len(), 2);
}

#[test]
fn test_revoke_all_sessions() {
    let (_dir, store, user) = setup();

    let t1 = store.create_session(user, None).unwrap();
    let t2 = store.create_session(user, None).unwrap();

    assert_eq!(store.revoke_all_sessions(user).unwrap(), 2);
    assert!(store.validate_session(&t1).unwrap().is_none());
    assert!(store.validate_session(&t2).unwrap().is_none());
}

#[test]
fn test_purge_expired_keeps_live_sessions() {
    let (_dir, store, user) = setup();

    store.create_session(user, Some(0)).unwrap();
    store.create_session(user, Some(0)).unwrap();
    let live = store.create_session(user, Some(3600)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));

    assert_eq!(store.purge_expired().unwrap(), 2);
    assert_eq!(store.purge_expired().unwrap(), 0);
    assert!(store.validate_session(&live).unwrap().is_some());
}

#[test]
fn test_count_sessions_includes_expired_until_purged() {
    let (_dir, store, user) = setup();

    store.create_session(user, Some(0)).unwrap();
    store.create_session(user, Some(3600)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));

    assert_eq!(store.list_sessions(user).unwrap().len(), 1);
    assert_eq!(store.count_sessions().unwrap(), 2);
    store.purge_expired().unwrap();
    assert_eq!(store.count_sessions().unwrap(), 1);
}

// ============================================================================
// Account Lifecycle
// ============================================================================

#[test]
fn test_deactivation_revokes_sessions() {
    let (_dir, store, user) = setup();

    let token = store.create_session(user, None).unwrap();
    store.set_active(user, false).unwrap();

    assert!(store.validate_session(&token).unwrap().is_none());
    assert!(store.list_sessions(user).unwrap().is_empty());
}

#[test]
fn test_reactivation_does_not_restore_sessions() {
    let (_dir, store, user) = setup();

    let token = store.create_session(user, None).unwrap();
    store.set_active(user, false).unwrap();
    store.set_active(user, true).unwrap();

    assert!(store.validate_session(&token).unwrap().is_none());
}

#[test]
fn test_delete_user_revokes_sessions() {
    let (_dir, store, user) = setup();

    let token = store.create_session(user, None).unwrap();
    assert!(store.delete_user(user).unwrap());

    assert!(store.validate_session(&token).unwrap().is_none());
}

#[test]
fn test_sessions_are_per_user() {
    let (_dir, store, user) = setup();
    let other = store
        .create_user("Other", "other@example.com", "$argon2id$placeholder", true, &[])
        .unwrap();

    store.create_session(user, None).unwrap();
    let keep = store.create_session(other.id, None).unwrap();

    assert_eq!(store.revoke_all_sessions(user).unwrap(), 1);
    assert_eq!(store.validate_session(&keep).unwrap().unwrap().user_id, other.id);
}
