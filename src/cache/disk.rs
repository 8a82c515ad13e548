//! Write-through persistence for cache entries.
//!
//! Layout: `<root>/<fingerprint-hex>/meta.json` plus one `f{frame:03}_t{tile:03}.png` per artifact.
//! Maintenance (`enumerate`, `purge_*`) reads only `meta.json`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context as _;

use crate::cache::fingerprint::Fingerprint;
use crate::cache::store::{ArtifactSet, CacheEntry, FrameArtifacts};
use crate::foundation::error::{GridmojiError, GridmojiResult};
use crate::transform::normalize::EmojiArtifact;

const META_FILE: &str = "meta.json";

/// Metadata record stored next to an entry's blobs.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EntryMeta {
    pub fingerprint: String,
    /// `"image"` or `"video"`.
    pub kind: String,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub expires_at: u64,
    pub frames: Vec<FrameMeta>,
    /// Total encoded artifact bytes.
    pub bytes: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameMeta {
    pub timestamp_sec: Option<f64>,
    pub tiles: usize,
}

/// A directory of persisted cache entries.
#[derive(Clone, Debug)]
pub struct DiskStore {
    root: PathBuf,
}

pub(crate) fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn blob_name(frame: usize, tile: usize) -> String {
    format!("f{frame:03}_t{tile:03}.png")
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> GridmojiResult<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create cache dir '{}'", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, fp: Fingerprint) -> PathBuf {
        self.root.join(fp.to_hex())
    }

    /// Persist an entry. Blobs go to a scratch directory that is renamed into place, so readers
    /// never see a half-written entry.
    pub fn store(&self, entry: &CacheEntry) -> GridmojiResult<()> {
        let hex = entry.fingerprint.to_hex();
        let scratch = self.root.join(format!(
            ".{hex}.tmp-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        std::fs::create_dir_all(&scratch)
            .with_context(|| format!("create '{}'", scratch.display()))?;

        let written = self.write_blobs(&scratch, entry);
        if let Err(e) = written {
            let _ = std::fs::remove_dir_all(&scratch);
            return Err(e);
        }

        let dest = self.entry_dir(entry.fingerprint);
        if dest.exists() {
            let _ = std::fs::remove_dir_all(&dest);
        }
        if let Err(e) = std::fs::rename(&scratch, &dest) {
            let _ = std::fs::remove_dir_all(&scratch);
            return Err(anyhow::Error::new(e)
                .context(format!("move cache entry into '{}'", dest.display()))
                .into());
        }
        tracing::debug!(fingerprint = %entry.fingerprint, "cache entry persisted");
        Ok(())
    }

    fn write_blobs(&self, dir: &Path, entry: &CacheEntry) -> GridmojiResult<()> {
        let frames = entry.artifacts.frames();
        for (fi, (_, tiles)) in frames.iter().enumerate() {
            for (ti, art) in tiles.iter().enumerate() {
                let path = dir.join(blob_name(fi, ti));
                std::fs::write(&path, &art.png[..])
                    .with_context(|| format!("write '{}'", path.display()))?;
            }
        }
        let meta = EntryMeta {
            fingerprint: entry.fingerprint.to_hex(),
            kind: entry.artifacts.kind().to_string(),
            created_at: unix_secs(entry.created_at),
            expires_at: unix_secs(entry.expires_at),
            frames: frames
                .iter()
                .map(|(ts, tiles)| FrameMeta {
                    timestamp_sec: *ts,
                    tiles: tiles.len(),
                })
                .collect(),
            bytes: entry.artifacts.byte_len() as u64,
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| GridmojiError::processing(format!("serialize cache meta: {e}")))?;
        let path = dir.join(META_FILE);
        std::fs::write(&path, json).with_context(|| format!("write '{}'", path.display()))?;
        Ok(())
    }

    fn read_meta(dir: &Path) -> GridmojiResult<Option<EntryMeta>> {
        let path = dir.join(META_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("read '{}'", path.display()))
                    .into());
            }
        };
        let meta = serde_json::from_slice(&bytes).map_err(|e| {
            GridmojiError::processing(format!("invalid cache meta '{}': {e}", path.display()))
        })?;
        Ok(Some(meta))
    }

    /// Load a non-expired entry. Expired entries found here are removed.
    pub fn load(&self, fp: Fingerprint, now: SystemTime) -> GridmojiResult<Option<CacheEntry>> {
        let dir = self.entry_dir(fp);
        let Some(meta) = Self::read_meta(&dir)? else {
            return Ok(None);
        };
        if unix_secs(now) >= meta.expires_at {
            let _ = std::fs::remove_dir_all(&dir);
            tracing::debug!(fingerprint = %fp, "expired disk entry removed on access");
            return Ok(None);
        }

        let mut frames = Vec::with_capacity(meta.frames.len());
        for (fi, fm) in meta.frames.iter().enumerate() {
            let mut tiles = Vec::with_capacity(fm.tiles);
            for ti in 0..fm.tiles {
                let path = dir.join(blob_name(fi, ti));
                let bytes =
                    std::fs::read(&path).with_context(|| format!("read '{}'", path.display()))?;
                tiles.push(EmojiArtifact::from_png(bytes)?);
            }
            frames.push((fm.timestamp_sec, tiles));
        }

        let artifacts = match meta.kind.as_str() {
            "image" => {
                let tiles = frames
                    .pop()
                    .filter(|_| frames.is_empty())
                    .map(|(_, t)| t)
                    .ok_or_else(|| {
                        GridmojiError::processing("image cache entry must hold one frame")
                    })?;
                ArtifactSet::Image { tiles }
            }
            "video" => ArtifactSet::Video {
                frames: frames
                    .into_iter()
                    .map(|(ts, tiles)| FrameArtifacts {
                        timestamp_sec: ts.unwrap_or(0.0),
                        tiles,
                    })
                    .collect(),
            },
            other => {
                return Err(GridmojiError::processing(format!(
                    "unknown cache entry kind '{other}'"
                )));
            }
        };

        Ok(Some(CacheEntry {
            fingerprint: fp,
            artifacts,
            created_at: UNIX_EPOCH + Duration::from_secs(meta.created_at),
            expires_at: UNIX_EPOCH + Duration::from_secs(meta.expires_at),
        }))
    }

    /// Metadata of every readable entry, oldest first.
    pub fn enumerate(&self) -> GridmojiResult<Vec<EntryMeta>> {
        let mut out = self
            .entries()?
            .into_iter()
            .map(|(_, meta)| meta)
            .collect::<Vec<_>>();
        out.sort_by(|a, b| {
            (a.created_at, &a.fingerprint).cmp(&(b.created_at, &b.fingerprint))
        });
        Ok(out)
    }

    fn entries(&self) -> GridmojiResult<Vec<(PathBuf, EntryMeta)>> {
        let rd = std::fs::read_dir(&self.root)
            .with_context(|| format!("list cache dir '{}'", self.root.display()))?;
        let mut out = Vec::new();
        for item in rd {
            let item = item.with_context(|| format!("list cache dir '{}'", self.root.display()))?;
            let path = item.path();
            let is_entry = path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.parse::<Fingerprint>().is_ok());
            if !is_entry {
                continue;
            }
            match Self::read_meta(&path) {
                Ok(Some(meta)) => out.push((path, meta)),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping entry"),
            }
        }
        Ok(out)
    }

    fn remove_where(&self, pred: impl Fn(&EntryMeta) -> bool) -> GridmojiResult<usize> {
        let mut removed = 0;
        for (path, meta) in self.entries()? {
            if pred(&meta) {
                std::fs::remove_dir_all(&path)
                    .with_context(|| format!("remove '{}'", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove entries created at least `age` before `now`.
    pub fn purge_older_than(&self, age: Duration, now: SystemTime) -> GridmojiResult<usize> {
        let cutoff = unix_secs(now).saturating_sub(age.as_secs());
        let removed = self.remove_where(|m| m.created_at <= cutoff)?;
        tracing::info!(removed, age_secs = age.as_secs(), "disk cache purged by age");
        Ok(removed)
    }

    /// Remove entries whose expiry is at or before `now`.
    pub fn purge_expired(&self, now: SystemTime) -> GridmojiResult<usize> {
        let now = unix_secs(now);
        self.remove_where(|m| m.expires_at <= now)
    }

    /// Remove every entry.
    pub fn purge_all(&self) -> GridmojiResult<usize> {
        self.remove_where(|_| true)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/disk.rs"]
mod tests;
