use std::sync::Mutex;

use crate::cache::{self, RtcCache, SERIAL_MAGIC};
use crate::error::FftError;

// Cache tests rewrite process environment; serialize them.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn with_cache_env<R>(dir: &tempfile::TempDir, read_only: bool, f: impl FnOnce() -> R) -> R {
    let prev_path = std::env::var_os("ROTORFFT_CACHE_PATH");
    let prev_ro = std::env::var_os("ROTORFFT_READ_CACHE_ONLY");
    std::env::set_var("ROTORFFT_CACHE_PATH", dir.path().join("cache.db"));
    if read_only {
        std::env::set_var("ROTORFFT_READ_CACHE_ONLY", "1");
    } else {
        std::env::remove_var("ROTORFFT_READ_CACHE_ONLY");
    }
    let out = f();
    match prev_path {
        Some(v) => std::env::set_var("ROTORFFT_CACHE_PATH", v),
        None => std::env::remove_var("ROTORFFT_CACHE_PATH"),
    }
    match prev_ro {
        Some(v) => std::env::set_var("ROTORFFT_READ_CACHE_ONLY", v),
        None => std::env::remove_var("ROTORFFT_READ_CACHE_ONLY"),
    }
    out
}

#[test]
fn put_get_round_trip() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    with_cache_env(&dir, false, || {
        let cache = RtcCache::open();
        let fp = [7u8; 32];
        assert_eq!(cache.get("k1", "gfx90a", 500, &fp).unwrap(), None);

        cache.put("k1", "gfx90a", 500, &fp, b"code-object").unwrap();
        assert_eq!(
            cache.get("k1", "gfx90a", 500, &fp).unwrap().as_deref(),
            Some(b"code-object".as_slice())
        );

        // Same key, different bytes: first insert wins, no error.
        cache.put("k1", "gfx90a", 500, &fp, b"other").unwrap();
        assert_eq!(
            cache.get("k1", "gfx90a", 500, &fp).unwrap().as_deref(),
            Some(b"code-object".as_slice())
        );

        // Any key component change misses.
        assert_eq!(cache.get("k1", "gfx1030", 500, &fp).unwrap(), None);
        assert_eq!(cache.get("k1", "gfx90a", 501, &fp).unwrap(), None);
        assert_eq!(cache.get("k1", "gfx90a", 500, &[0u8; 32]).unwrap(), None);
    });
}

#[test]
fn cache_survives_reopen() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    with_cache_env(&dir, false, || {
        {
            let cache = RtcCache::open();
            cache.put("persist", "gfx90a", 1, &[1u8], b"bytes").unwrap();
        }
        let cache = RtcCache::open();
        assert_eq!(
            cache.get("persist", "gfx90a", 1, &[1u8]).unwrap().as_deref(),
            Some(b"bytes".as_slice())
        );
    });
}

#[test]
fn read_only_mode_drops_stores() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    with_cache_env(&dir, true, || {
        let cache = RtcCache::open();
        cache.put("ro", "gfx90a", 1, &[1u8], b"bytes").unwrap();
        assert_eq!(cache.get("ro", "gfx90a", 1, &[1u8]).unwrap(), None);
    });
}

#[test]
fn serialize_deserialize_round_trip() {
    // Serialize, wipe, deserialize: previously stored keys must still
    // resolve to the same bytes.
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let image = with_cache_env(&dir, false, || {
        let cache = RtcCache::open();
        cache.put("kk", "gfx90a", 600, &[9u8; 16], b"compiled").unwrap();
        cache.serialize().unwrap()
    });
    assert_eq!(&image[..16], &SERIAL_MAGIC);

    // A fresh cache in a different location starts empty, then adopts the
    // image wholesale.
    let dir2 = tempfile::tempdir().unwrap();
    with_cache_env(&dir2, false, || {
        let cache = RtcCache::open();
        assert_eq!(cache.get("kk", "gfx90a", 600, &[9u8; 16]).unwrap(), None);
        cache.deserialize(&image).unwrap();
        assert_eq!(
            cache.get("kk", "gfx90a", 600, &[9u8; 16]).unwrap().as_deref(),
            Some(b"compiled".as_slice())
        );
        // Idempotent: get behavior unchanged after another round.
        let again = cache.serialize().unwrap();
        cache.deserialize(&again).unwrap();
        assert_eq!(
            cache.get("kk", "gfx90a", 600, &[9u8; 16]).unwrap().as_deref(),
            Some(b"compiled".as_slice())
        );
    });
}

#[test]
fn malformed_payloads_are_invalid_argument() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    with_cache_env(&dir, false, || {
        let cache = RtcCache::open();
        for bad in [
            &b""[..],
            &b"short"[..],
            &[0u8; 64][..], // wrong magic
        ] {
            let err = cache.deserialize(bad).unwrap_err();
            assert!(matches!(err, FftError::InvalidArgument(_)), "{err}");
        }

        // Right header, garbage body.
        let mut junk = Vec::new();
        junk.extend_from_slice(&SERIAL_MAGIC);
        junk.extend_from_slice(&1u32.to_le_bytes());
        junk.extend_from_slice(&[0xAB; 100]);
        let err = cache.deserialize(&junk).unwrap_err();
        assert!(matches!(err, FftError::InvalidArgument(_)));

        // Wrong version word.
        let mut wrong_ver = Vec::new();
        wrong_ver.extend_from_slice(&SERIAL_MAGIC);
        wrong_ver.extend_from_slice(&99u32.to_le_bytes());
        let err = cache.deserialize(&wrong_ver).unwrap_err();
        assert!(matches!(err, FftError::InvalidArgument(_)));
    });
}

#[test]
fn process_singleton_init_and_teardown() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    with_cache_env(&dir, false, || {
        cache::cache_teardown();
        assert!(cache::cache().is_none());
        assert!(cache::cache_serialize().is_err());

        cache::cache_init();
        assert!(cache::cache().is_some());
        let bytes = cache::cache_serialize().unwrap();
        assert!(bytes.len() >= 20);
        cache::cache_deserialize(&bytes).unwrap();

        cache::cache_teardown();
        assert!(cache::cache().is_none());
    });
}

#[test]
fn unwritable_path_degrades_to_memory() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let prev = std::env::var_os("ROTORFFT_CACHE_PATH");
    std::env::set_var(
        "ROTORFFT_CACHE_PATH",
        "/nonexistent-dir/definitely/not/here/cache.db",
    );
    let cache = RtcCache::open();
    cache.put("mem", "gfx90a", 1, &[1u8], b"bytes").unwrap();
    assert_eq!(
        cache.get("mem", "gfx90a", 1, &[1u8]).unwrap().as_deref(),
        Some(b"bytes".as_slice())
    );
    match prev {
        Some(v) => std::env::set_var("ROTORFFT_CACHE_PATH", v),
        None => std::env::remove_var("ROTORFFT_CACHE_PATH"),
    }
}
