use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use super::*;
use crate::foundation::core::{Channels, EMOJI_SIZE, RasterFrame, Rgba8};
use crate::foundation::error::ErrorKind;

fn fp(n: u64) -> Fingerprint {
    Fingerprint { hi: n, lo: n * 31 }
}

fn set(v: u8) -> ArtifactSet {
    let frame = RasterFrame::filled(EMOJI_SIZE, EMOJI_SIZE, Channels::Rgb8, Rgba8::rgb(v, 0, 0));
    ArtifactSet::Image {
        tiles: vec![EmojiArtifact::encode(&frame).unwrap()],
    }
}

#[test]
fn second_lookup_is_a_hit() {
    let cache = ArtifactCache::in_memory(Duration::from_secs(60));
    let a = cache.get_or_compute(fp(1), None, || Ok(set(1))).unwrap();
    assert!(a.computed);
    let b = cache
        .get_or_compute(fp(1), None, || panic!("must not recompute"))
        .unwrap();
    assert!(!b.computed);
    assert!(Arc::ptr_eq(&a.entry, &b.entry));

    let stats = cache.stats();
    assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
    assert!(stats.bytes > 0);
    assert!(cache.get(fp(1)).is_some());
    assert!(cache.get(fp(2)).is_none());
}

#[test]
fn failures_are_not_stored() {
    let cache = ArtifactCache::in_memory(Duration::from_secs(60));
    let err = cache
        .get_or_compute(fp(1), None, || Err(GridmojiError::processing("boom")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Processing);
    assert_eq!(cache.stats().entries, 0);
    assert_eq!(cache.stats().in_flight, 0);
    assert!(
        cache
            .get_or_compute(fp(1), None, || Ok(set(1)))
            .unwrap()
            .computed
    );
}

#[test]
fn expired_entries_are_evicted_on_access() {
    let cache = ArtifactCache::in_memory(Duration::ZERO);
    cache.get_or_compute(fp(1), None, || Ok(set(1))).unwrap();
    let again = cache.get_or_compute(fp(1), None, || Ok(set(2))).unwrap();
    assert!(again.computed);
}

#[test]
fn sweep_and_purge_clear_entries() {
    let cache = ArtifactCache::in_memory(Duration::from_secs(60));
    cache.get_or_compute(fp(1), None, || Ok(set(1))).unwrap();
    cache.get_or_compute(fp(2), None, || Ok(set(2))).unwrap();

    assert_eq!(cache.sweep_expired(), 0);
    let later = SystemTime::now() + Duration::from_secs(61);
    assert_eq!(cache.sweep_expired_at(later), 2);

    cache.get_or_compute(fp(3), None, || Ok(set(3))).unwrap();
    assert_eq!(cache.purge().unwrap(), 1);
    assert_eq!(cache.stats().entries, 0);
}

#[test]
fn concurrent_callers_share_one_computation() {
    let cache = Arc::new(ArtifactCache::in_memory(Duration::from_secs(60)));
    let runs = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();

    let leader = {
        let cache = Arc::clone(&cache);
        let runs = Arc::clone(&runs);
        std::thread::spawn(move || {
            cache
                .get_or_compute(fp(7), None, || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    started_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(set(7))
                })
                .unwrap()
        })
    };
    started_rx.recv().unwrap();

    let waiters = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let runs = Arc::clone(&runs);
            std::thread::spawn(move || {
                cache
                    .get_or_compute(fp(7), None, || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(set(99))
                    })
                    .unwrap()
            })
        })
        .collect::<Vec<_>>();

    let lead = leader.join().unwrap();
    assert!(lead.computed);
    for w in waiters {
        let got = w.join().unwrap();
        assert!(!got.computed);
        assert_eq!(got.entry.artifacts, lead.entry.artifacts);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn waiters_receive_the_leaders_failure() {
    let cache = Arc::new(ArtifactCache::in_memory(Duration::from_secs(60)));
    let (started_tx, started_rx) = mpsc::channel();
    let leader = {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || {
            cache.get_or_compute(fp(8), None, || {
                started_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(100));
                Err(GridmojiError::dimension("too small"))
            })
        })
    };
    started_rx.recv().unwrap();
    let err = cache
        .get_or_compute(fp(8), None, || Ok(set(1)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dimension);
    assert!(leader.join().unwrap().is_err());
    assert_eq!(cache.stats().entries, 0);
}

#[test]
fn waiter_takes_over_when_the_leader_times_out() {
    let cache = Arc::new(ArtifactCache::in_memory(Duration::from_secs(60)));
    let runs = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();
    let leader = {
        let cache = Arc::clone(&cache);
        let runs = Arc::clone(&runs);
        std::thread::spawn(move || {
            cache.get_or_compute(fp(10), Some(Instant::now() + Duration::from_millis(100)), || {
                runs.fetch_add(1, Ordering::SeqCst);
                started_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(100));
                Err(GridmojiError::timeout("normalizing", Duration::from_millis(100)))
            })
        })
    };
    started_rx.recv().unwrap();

    let deadline = Instant::now() + Duration::from_secs(600);
    let got = cache
        .get_or_compute(fp(10), Some(deadline), || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(set(10))
        })
        .unwrap();
    assert!(got.computed);
    assert_eq!(got.entry.artifacts, set(10));
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let err = leader.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let stats = cache.stats();
    assert_eq!((stats.entries, stats.in_flight, stats.misses), (1, 0, 2));
}

#[test]
fn waiter_gives_up_at_its_deadline() {
    let cache = Arc::new(ArtifactCache::in_memory(Duration::from_secs(60)));
    let (started_tx, started_rx) = mpsc::channel();
    let leader = {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || {
            cache.get_or_compute(fp(9), None, || {
                started_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(300));
                Ok(set(9))
            })
        })
    };
    started_rx.recv().unwrap();
    let deadline = Instant::now() + Duration::from_millis(20);
    let err = cache
        .get_or_compute(fp(9), Some(deadline), || Ok(set(1)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(leader.join().unwrap().unwrap().computed);
}

#[test]
fn panicking_computation_releases_its_flight() {
    let cache = ArtifactCache::in_memory(Duration::from_secs(60));
    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = cache.get_or_compute(fp(4), None, || panic!("compute blew up"));
    }));
    assert!(caught.is_err());
    assert_eq!(cache.stats().in_flight, 0);
    assert!(
        cache
            .get_or_compute(fp(4), None, || Ok(set(4)))
            .unwrap()
            .computed
    );
}

#[test]
fn shutdown_drains_and_refuses_new_work() {
    let cache = Arc::new(ArtifactCache::in_memory(Duration::from_secs(60)));
    let (started_tx, started_rx) = mpsc::channel();
    let worker = {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || {
            cache.get_or_compute(fp(5), None, || {
                started_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(100));
                Ok(set(5))
            })
        })
    };
    started_rx.recv().unwrap();
    cache.shutdown();
    assert_eq!(cache.stats().in_flight, 0);
    assert_eq!(cache.stats().entries, 1);
    assert!(worker.join().unwrap().is_ok());
    assert!(cache.get_or_compute(fp(6), None, || Ok(set(6))).is_err());
    cache.shutdown();
}

#[test]
fn config_cache_persists_and_reloads() {
    let dir = std::env::temp_dir().join(format!(
        "gridmoji_store_{}_{}",
        std::process::id(),
        SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let cfg = CacheConfig {
        ttl_secs: 600,
        sweep_interval_secs: Some(1),
        persist_dir: Some(dir.clone()),
        ..CacheConfig::default()
    };
    {
        let cache = ArtifactCache::new(&cfg).unwrap();
        assert!(cache.get_or_compute(fp(11), None, || Ok(set(11))).unwrap().computed);
    }
    let cache = ArtifactCache::new(&cfg).unwrap();
    let reloaded = cache
        .get_or_compute(fp(11), None, || panic!("should come from disk"))
        .unwrap();
    assert!(!reloaded.computed);
    assert_eq!(reloaded.entry.artifacts, set(11));
    cache.shutdown();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn oldest_entries_are_evicted_past_max_entries() {
    let cache = ArtifactCache::bounded(
        Duration::from_secs(60),
        CacheLimits {
            max_entries: Some(2),
            max_bytes: None,
        },
    );
    for n in 1..=3 {
        cache.get_or_compute(fp(n), None, || Ok(set(n as u8))).unwrap();
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(cache.get(fp(1)).is_none());
    assert!(cache.get(fp(2)).is_some());
    assert!(cache.get(fp(3)).is_some());

    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.max_entries, Some(2));
    assert_eq!(stats.max_bytes, None);
}

#[test]
fn byte_limit_keeps_the_newest_entry() {
    let one = set(1).byte_len() as u64;
    let cache = ArtifactCache::bounded(
        Duration::from_secs(60),
        CacheLimits {
            max_entries: None,
            max_bytes: Some(one),
        },
    );
    cache.get_or_compute(fp(1), None, || Ok(set(1))).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    cache.get_or_compute(fp(2), None, || Ok(set(1))).unwrap();
    assert!(cache.get(fp(1)).is_none());
    assert!(cache.get(fp(2)).is_some());

    let tiny = ArtifactCache::bounded(
        Duration::from_secs(60),
        CacheLimits {
            max_entries: None,
            max_bytes: Some(1),
        },
    );
    let got = tiny.get_or_compute(fp(3), None, || Ok(set(3))).unwrap();
    assert!(got.computed);
    assert!(tiny.get(fp(3)).is_some());
    assert_eq!(tiny.stats().evictions, 0);
}

#[test]
fn config_limits_reach_the_cache() {
    let cfg = CacheConfig {
        sweep_interval_secs: None,
        max_entries: Some(7),
        max_bytes: None,
        ..CacheConfig::default()
    };
    let cache = ArtifactCache::new(&cfg).unwrap();
    assert_eq!(
        cache.limits(),
        CacheLimits {
            max_entries: Some(7),
            max_bytes: None,
        }
    );
}
