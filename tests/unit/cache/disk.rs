use super::*;
use crate::foundation::core::{Channels, EMOJI_SIZE, RasterFrame, Rgba8};

fn temp_root(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "gridmoji_disk_{tag}_{}_{}",
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn artifact(v: u8) -> EmojiArtifact {
    let frame = RasterFrame::filled(EMOJI_SIZE, EMOJI_SIZE, Channels::Rgb8, Rgba8::rgb(v, v, v));
    EmojiArtifact::encode(&frame).unwrap()
}

fn entry(seed: u64, artifacts: ArtifactSet, created_at: SystemTime, ttl: Duration) -> CacheEntry {
    CacheEntry {
        fingerprint: Fingerprint { hi: seed, lo: !seed },
        artifacts,
        created_at,
        expires_at: created_at + ttl,
    }
}

#[test]
fn image_entry_round_trips() {
    let root = temp_root("image");
    let store = DiskStore::open(&root).unwrap();
    let now = SystemTime::now();
    let e = entry(
        1,
        ArtifactSet::Image {
            tiles: vec![artifact(1), artifact(2), artifact(3)],
        },
        now,
        Duration::from_secs(3600),
    );
    store.store(&e).unwrap();
    assert!(root.join(e.fingerprint.to_hex()).join("f000_t002.png").exists());

    let back = store.load(e.fingerprint, now).unwrap().unwrap();
    assert_eq!(back.artifacts, e.artifacts);
    assert_eq!(unix_secs(back.created_at), unix_secs(now));
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn video_entry_keeps_frame_order_and_timestamps() {
    let root = temp_root("video");
    let store = DiskStore::open(&root).unwrap();
    let now = SystemTime::now();
    let frames = vec![
        FrameArtifacts {
            timestamp_sec: 0.0,
            tiles: vec![artifact(10), artifact(11)],
        },
        FrameArtifacts {
            timestamp_sec: 1.5,
            tiles: vec![artifact(20), artifact(21)],
        },
    ];
    let e = entry(
        2,
        ArtifactSet::Video { frames },
        now,
        Duration::from_secs(60),
    );
    store.store(&e).unwrap();
    let back = store.load(e.fingerprint, now).unwrap().unwrap();
    assert_eq!(back.artifacts, e.artifacts);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn missing_and_expired_entries_load_as_none() {
    let root = temp_root("expired");
    let store = DiskStore::open(&root).unwrap();
    let fp = Fingerprint { hi: 9, lo: 9 };
    assert!(store.load(fp, SystemTime::now()).unwrap().is_none());

    let created = SystemTime::now() - Duration::from_secs(100);
    let e = entry(
        3,
        ArtifactSet::Image {
            tiles: vec![artifact(5)],
        },
        created,
        Duration::from_secs(10),
    );
    store.store(&e).unwrap();
    assert!(store.load(e.fingerprint, SystemTime::now()).unwrap().is_none());
    assert!(!root.join(e.fingerprint.to_hex()).exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn enumerate_and_purge_use_metadata() {
    let root = temp_root("purge");
    let store = DiskStore::open(&root).unwrap();
    let now = SystemTime::now();
    let old = entry(
        4,
        ArtifactSet::Image {
            tiles: vec![artifact(1)],
        },
        now - Duration::from_secs(7200),
        Duration::from_secs(86_400),
    );
    let fresh = entry(
        5,
        ArtifactSet::Image {
            tiles: vec![artifact(2)],
        },
        now,
        Duration::from_secs(86_400),
    );
    store.store(&old).unwrap();
    store.store(&fresh).unwrap();
    std::fs::create_dir_all(root.join("not-an-entry")).unwrap();

    let listed = store.enumerate().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].fingerprint, old.fingerprint.to_hex());
    assert!(listed.iter().all(|m| m.kind == "image" && m.bytes > 0));

    assert_eq!(
        store
            .purge_older_than(Duration::from_secs(3600), now)
            .unwrap(),
        1
    );
    assert_eq!(store.enumerate().unwrap().len(), 1);
    assert_eq!(store.purge_all().unwrap(), 1);
    assert!(store.enumerate().unwrap().is_empty());
    assert!(root.join("not-an-entry").exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn purge_expired_removes_only_stale_entries() {
    let root = temp_root("sweep");
    let store = DiskStore::open(&root).unwrap();
    let now = SystemTime::now();
    let stale = entry(
        6,
        ArtifactSet::Image {
            tiles: vec![artifact(1)],
        },
        now - Duration::from_secs(50),
        Duration::from_secs(10),
    );
    let live = entry(
        7,
        ArtifactSet::Image {
            tiles: vec![artifact(1)],
        },
        now,
        Duration::from_secs(600),
    );
    store.store(&stale).unwrap();
    store.store(&live).unwrap();
    assert_eq!(store.purge_expired(now).unwrap(), 1);
    assert!(store.load(live.fingerprint, now).unwrap().is_some());
    let _ = std::fs::remove_dir_all(&root);
}
