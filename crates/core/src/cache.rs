//! The process-wide RTC code-object cache.
//!
//! Compiled kernels are keyed by (kernel name, GPU arch, driver version,
//! generator fingerprint) and stored in an embedded sqlite database so they
//! survive the process. One connection serves lookups and one serves
//! stores, each behind its own mutex so concurrent get/put never stomp each
//! other's bound parameters; (de)serialization takes the schema lock
//! exclusively because it swaps the database contents wholesale.
//!
//! Failures opening or querying the backing file degrade to an in-memory
//! database rather than failing plan construction; a missing key is an
//! ordinary miss, never an error.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::{FftError, Result};

/// Leading bytes of a serialized cache image.
pub const SERIAL_MAGIC: [u8; 16] = *b"rotorfftcache\0\0\0";
/// Little-endian version word following the magic.
pub const SERIAL_VERSION: u32 = 1;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kernels (
  name       TEXT NOT NULL,
  arch       TEXT NOT NULL,
  driver_ver INTEGER NOT NULL,
  gen_fp     BLOB NOT NULL,
  code       BLOB NOT NULL,
  PRIMARY KEY (name, arch, driver_ver, gen_fp)
)";

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct RtcCache {
    get_conn: Mutex<Connection>,
    put_conn: Mutex<Connection>,
    /// Held shared by get/put, exclusively by deserialize.
    schema_lock: RwLock<()>,
    read_only: bool,
}

impl RtcCache {
    /// Open the cache at `ROTORFFT_CACHE_PATH` (or the default location),
    /// falling back to memory-only on any I/O problem.
    pub fn open() -> RtcCache {
        let read_only = std::env::var_os("ROTORFFT_READ_CACHE_ONLY").is_some();
        let path = std::env::var_os("ROTORFFT_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("rotorfft_kernel_cache.db"));

        match Self::open_file_pair(&path) {
            Ok((get_conn, put_conn)) => RtcCache {
                get_conn: Mutex::new(get_conn),
                put_conn: Mutex::new(put_conn),
                schema_lock: RwLock::new(()),
                read_only,
            },
            Err(e) => {
                log::warn!(
                    "cannot use kernel cache file {}: {e}; continuing in memory",
                    path.display()
                );
                let (get_conn, put_conn) =
                    Self::open_memory_pair().expect("in-memory sqlite database");
                RtcCache {
                    get_conn: Mutex::new(get_conn),
                    put_conn: Mutex::new(put_conn),
                    schema_lock: RwLock::new(()),
                    read_only,
                }
            }
        }
    }

    fn open_file_pair(path: &std::path::Path) -> rusqlite::Result<(Connection, Connection)> {
        let put_conn = Connection::open(path)?;
        put_conn.busy_timeout(Duration::from_secs(5))?;
        put_conn.execute_batch(SCHEMA)?;
        let get_conn = Connection::open(path)?;
        get_conn.busy_timeout(Duration::from_secs(5))?;
        Ok((get_conn, put_conn))
    }

    /// Two handles onto one shared-cache in-memory database, so lookups see
    /// stores exactly as they would through a file.
    fn open_memory_pair() -> rusqlite::Result<(Connection, Connection)> {
        let uri = format!(
            "file:rotorfft_rtc_{}_{}?mode=memory&cache=shared",
            std::process::id(),
            SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed),
        );
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
        let put_conn = Connection::open_with_flags(&uri, flags)?;
        put_conn.execute_batch(SCHEMA)?;
        let get_conn = Connection::open_with_flags(&uri, flags)?;
        Ok((get_conn, put_conn))
    }

    /// Fetch a code object; a missing key is `Ok(None)`.
    pub fn get(
        &self,
        name: &str,
        arch: &str,
        driver_ver: u32,
        gen_fp: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let _schema = self.schema_lock.read();
        let conn = self.get_conn.lock();
        let fetch = || -> rusqlite::Result<Option<Vec<u8>>> {
            let mut stmt = conn.prepare_cached(
                "SELECT code FROM kernels WHERE name=?1 AND arch=?2 AND driver_ver=?3 AND gen_fp=?4",
            )?;
            stmt.query_row(params![name, arch, driver_ver, gen_fp], |row| row.get(0))
                .optional()
        };
        match fetch() {
            Ok(code) => Ok(code),
            Err(e) => {
                log::warn!("kernel cache lookup failed for {name}: {e}");
                Ok(None)
            }
        }
    }

    /// Store a code object; duplicate inserts are no-ops, and the read-only
    /// mode drops stores silently.
    pub fn put(
        &self,
        name: &str,
        arch: &str,
        driver_ver: u32,
        gen_fp: &[u8],
        code: &[u8],
    ) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let _schema = self.schema_lock.read();
        let conn = self.put_conn.lock();
        let store = || -> rusqlite::Result<usize> {
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO kernels (name, arch, driver_ver, gen_fp, code) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            stmt.execute(params![name, arch, driver_ver, gen_fp, code])
        };
        if let Err(e) = store() {
            log::warn!("kernel cache store failed for {name}: {e}");
        }
        Ok(())
    }

    /// Produce the native backup image, framed with magic and version.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let _schema = self.schema_lock.read();
        let conn = self.get_conn.lock();

        let scratch = scratch_path("ser");
        let dump = (|| -> rusqlite::Result<()> {
            let mut dst = Connection::open(&scratch)?;
            let backup = rusqlite::backup::Backup::new(&conn, &mut dst)?;
            backup.run_to_completion(64, Duration::from_millis(5), None)?;
            Ok(())
        })();
        let image = dump
            .map_err(|e| FftError::DeviceFailure(format!("cache serialization failed: {e}")))
            .and_then(|()| {
                std::fs::read(&scratch).map_err(|e| {
                    FftError::DeviceFailure(format!("cache serialization failed: {e}"))
                })
            });
        let _ = std::fs::remove_file(&scratch);
        let image = image?;

        let mut out = Vec::with_capacity(20 + image.len());
        out.extend_from_slice(&SERIAL_MAGIC);
        out.extend_from_slice(&SERIAL_VERSION.to_le_bytes());
        out.extend_from_slice(&image);
        Ok(out)
    }

    /// Replace the cache contents with a previously serialized image.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < 20 || bytes[..16] != SERIAL_MAGIC {
            return Err(FftError::invalid("cache payload has no valid header"));
        }
        let version = u32::from_le_bytes(bytes[16..20].try_into().expect("4 bytes"));
        if version != SERIAL_VERSION {
            return Err(FftError::invalid(format!(
                "cache payload version {version} not supported"
            )));
        }

        let scratch = scratch_path("deser");
        std::fs::write(&scratch, &bytes[20..])
            .map_err(|e| FftError::invalid(format!("cache payload not materializable: {e}")))?;

        // Exclusive: attaching the payload swaps the whole schema out from
        // under concurrent readers.
        let _schema = self.schema_lock.write();
        let mut conn = self.get_conn.lock();
        let restore = (|| -> rusqlite::Result<()> {
            let src = Connection::open_with_flags(
                &scratch,
                OpenFlags::SQLITE_OPEN_READ_ONLY,
            )?;
            // Reject payloads that are not really sqlite images before they
            // replace live data.
            src.query_row("SELECT count(*) FROM kernels", [], |row| {
                row.get::<_, i64>(0)
            })?;
            let backup = rusqlite::backup::Backup::new(&src, &mut *conn)?;
            backup.run_to_completion(64, Duration::from_millis(5), None)?;
            Ok(())
        })();
        let _ = std::fs::remove_file(&scratch);
        restore.map_err(|e| FftError::invalid(format!("malformed cache payload: {e}")))
    }
}

fn scratch_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "rotorfft-cache-{tag}-{}-{}",
        std::process::id(),
        SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed),
    ))
}

// ============================================================================
// Process-wide singleton
// ============================================================================

fn slot() -> &'static StdMutex<Option<Arc<RtcCache>>> {
    static SLOT: OnceLock<StdMutex<Option<Arc<RtcCache>>>> = OnceLock::new();
    SLOT.get_or_init(|| StdMutex::new(None))
}

/// Open the process cache; called from library setup. Idempotent.
pub fn cache_init() {
    let mut guard = slot().lock().expect("cache slot poisoned");
    if guard.is_none() {
        *guard = Some(Arc::new(RtcCache::open()));
    }
}

/// Drop the process cache; called from library cleanup.
pub fn cache_teardown() {
    let mut guard = slot().lock().expect("cache slot poisoned");
    guard.take();
}

/// The live cache, if the library has been set up.
pub fn cache() -> Option<Arc<RtcCache>> {
    slot().lock().expect("cache slot poisoned").clone()
}

pub fn cache_serialize() -> Result<Vec<u8>> {
    cache()
        .ok_or_else(|| FftError::invalid("library not set up; no cache to serialize"))?
        .serialize()
}

pub fn cache_deserialize(bytes: &[u8]) -> Result<()> {
    cache()
        .ok_or_else(|| FftError::invalid("library not set up; no cache to load into"))?
        .deserialize(bytes)
}
