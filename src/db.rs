//! LMDB environment, table handles and the `Store` that owns them

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use heed::types::{Bytes, SerdeJson, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::debug;

use crate::constants::{DEFAULT_MAP_SIZE, MAX_DBS};
use crate::error::{Error, Result};
use crate::model::{Permission, Role, User};
use crate::session::Session;

type BigEndianU64 = U64<byteorder::BigEndian>;

// Database type aliases
pub type Db = Database<Bytes, BigEndianU64>;
pub type Records<T> = Database<BigEndianU64, SerdeJson<T>>;
pub type NameIndex = Database<Str, BigEndianU64>;

/// Create a 16-byte key from two u64 values
#[inline]
pub fn key(a: u64, b: u64) -> [u8; 16] {
    let mut k = [0u8; 16];
    k[..8].copy_from_slice(&a.to_be_bytes());
    k[8..].copy_from_slice(&b.to_be_bytes());
    k
}

/// Milliseconds since the Unix epoch
#[inline]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Bidirectional association index: fwd[a,b] and rev[b,a] stay in sync
pub struct BiPair {
    pub fwd: Db,
    pub rev: Db,
}

impl BiPair {
    #[inline]
    pub fn contains(&self, tx: &RoTxn, a: u64, b: u64) -> Result<bool> {
        Ok(self.fwd.get(tx, &key(a, b))?.is_some())
    }

    #[inline]
    pub fn put(&self, tx: &mut RwTxn, a: u64, b: u64, v: u64) -> Result<()> {
        self.fwd.put(tx, &key(a, b), &v)?;
        self.rev.put(tx, &key(b, a), &v)?;
        Ok(())
    }

    #[inline]
    pub fn del(&self, tx: &mut RwTxn, a: u64, b: u64) -> Result<bool> {
        let r = self.fwd.delete(tx, &key(a, b))?;
        self.rev.delete(tx, &key(b, a))?;
        Ok(r)
    }

    /// Remove every (a, *) pair and its reverse entries
    pub fn del_fwd_all(&self, tx: &mut RwTxn, a: u64) -> Result<usize> {
        let bs = self.list_fwd(tx, a)?;
        for b in &bs {
            self.del(tx, a, *b)?;
        }
        Ok(bs.len())
    }

    /// Remove every (*, b) pair and its reverse entries
    pub fn del_rev_all(&self, tx: &mut RwTxn, b: u64) -> Result<usize> {
        let owners = self.list_rev(tx, b)?;
        for a in &owners {
            self.del(tx, *a, b)?;
        }
        Ok(owners.len())
    }

    pub fn list_fwd(&self, tx: &RoTxn, a: u64) -> Result<Vec<u64>> {
        Self::list_pfx(tx, &self.fwd, a)
    }

    pub fn list_rev(&self, tx: &RoTxn, b: u64) -> Result<Vec<u64>> {
        Self::list_pfx(tx, &self.rev, b)
    }

    pub fn clear(&self, tx: &mut RwTxn) -> Result<()> {
        self.fwd.clear(tx)?;
        self.rev.clear(tx)?;
        Ok(())
    }

    fn list_pfx(tx: &RoTxn, db: &Db, pfx: u64) -> Result<Vec<u64>> {
        let mut r = Vec::new();
        for item in db.prefix_iter(tx, &pfx.to_be_bytes())? {
            let (k, _) = item?;
            let tail: [u8; 8] = k
                .get(8..16)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| Error::Corrupted(format!("association key of {} bytes", k.len())))?;
            r.push(u64::from_be_bytes(tail));
        }
        Ok(r)
    }
}

/// All database handles
pub struct Dbs {
    pub users: Records<User>,
    pub user_emails: NameIndex,
    pub roles: Records<Role>,
    pub role_names: NameIndex,
    pub permissions: Records<Permission>,
    pub permission_names: NameIndex,
    /// user -> role
    pub user_roles: BiPair,
    /// role -> permission
    pub role_permissions: BiPair,
    /// sha256(token) -> session
    pub sessions: Database<Str, SerdeJson<Session>>,
    /// "{user_id}/{sha256(token)}" -> expires_at
    pub sessions_by_user: NameIndex,
    pub meta: Database<Str, Str>,
}

/// Environment sizing for `Store::open_with`
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub map_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { map_size: DEFAULT_MAP_SIZE }
    }
}

/// The credential store: one LMDB environment and its named databases.
///
/// Cheap to share behind an `Arc`; reads run in concurrent read
/// transactions, writes are serialized by LMDB's single writer.
pub struct Store {
    env: Env,
    dbs: Dbs,
}

impl Store {
    /// Open (or create) a store at `path` with default sizing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };
        let mut tx = env.write_txn()?;
        let dbs = Dbs {
            users: env.create_database(&mut tx, Some("users"))?,
            user_emails: env.create_database(&mut tx, Some("user_emails"))?,
            roles: env.create_database(&mut tx, Some("roles"))?,
            role_names: env.create_database(&mut tx, Some("role_names"))?,
            permissions: env.create_database(&mut tx, Some("permissions"))?,
            permission_names: env.create_database(&mut tx, Some("permission_names"))?,
            user_roles: BiPair {
                fwd: env.create_database(&mut tx, Some("user_roles"))?,
                rev: env.create_database(&mut tx, Some("role_users"))?,
            },
            role_permissions: BiPair {
                fwd: env.create_database(&mut tx, Some("role_permissions"))?,
                rev: env.create_database(&mut tx, Some("permission_roles"))?,
            },
            sessions: env.create_database(&mut tx, Some("sessions"))?,
            sessions_by_user: env.create_database(&mut tx, Some("sessions_by_user"))?,
            meta: env.create_database(&mut tx, Some("meta"))?,
        };
        tx.commit()?;
        debug!(path = %path.display(), map_size = options.map_size, "store opened");
        Ok(Store { env, dbs })
    }

    /// Filesystem location of the environment
    pub fn path(&self) -> &Path {
        self.env.path()
    }

    /// Execute a read-only operation
    #[inline]
    pub(crate) fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        let tx = self.env.read_txn()?;
        f(&self.dbs, &tx)
    }

    #[inline]
    pub(crate) fn parts(&self) -> (&Env, &Dbs) {
        (&self.env, &self.dbs)
    }
}
