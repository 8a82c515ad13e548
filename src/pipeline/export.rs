//! Writing finished artifact sets to a directory as an emoji pack, optionally zipped.

use std::io::Write as _;
use std::path::Path;
use std::time::SystemTime;

use anyhow::Context as _;

use crate::cache::disk::unix_secs;
use crate::cache::store::ArtifactSet;
use crate::foundation::core::{EMOJI_SIZE, GridSpec};
use crate::foundation::error::{GridmojiError, GridmojiResult};

const MAX_NAME_LEN: usize = 100;

/// Contents of `pack.json`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackManifest {
    pub name: String,
    /// `"image"` or `"video"`.
    pub kind: String,
    pub grid: String,
    /// Static emojis for images; animated cells for video.
    pub emoji_count: usize,
    /// Paths relative to the pack directory.
    pub files: Vec<String>,
    /// Unix seconds.
    pub created_at: u64,
    pub size: String,
}

/// Make `name` safe to use as a file-name stem.
pub fn safe_filename(name: &str) -> String {
    let replaced = name
        .chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_whitespace()
            {
                '_'
            } else {
                c
            }
        })
        .collect::<String>();
    let trimmed = replaced
        .trim_matches(|c| c == '.' || c == '_')
        .chars()
        .take(MAX_NAME_LEN)
        .collect::<String>();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

/// Write `set` under `dir` and return the manifest (also written as `pack.json`).
///
/// Images become `<name>_emoji_<NNN>.png` in row-major order. Video is regrouped per grid
/// position into `<name>_cell_<NNN>/frame_<FFF>.png`, one directory per animated emoji.
pub fn write_pack(
    dir: &Path,
    name: &str,
    grid: GridSpec,
    set: &ArtifactSet,
) -> GridmojiResult<PackManifest> {
    let stem = safe_filename(name);
    std::fs::create_dir_all(dir).with_context(|| format!("create '{}'", dir.display()))?;

    let mut files = Vec::new();
    let emoji_count = match set {
        ArtifactSet::Image { tiles } => {
            for (i, art) in tiles.iter().enumerate() {
                let rel = format!("{stem}_emoji_{:03}.png", i + 1);
                write_file(dir, &rel, &art.png)?;
                files.push(rel);
            }
            tiles.len()
        }
        ArtifactSet::Video { frames } => {
            let cells = frames.first().map_or(0, |f| f.tiles.len());
            if frames.iter().any(|f| f.tiles.len() != cells) {
                return Err(GridmojiError::processing(
                    "video frames disagree on tile count",
                ));
            }
            for cell in 0..cells {
                let cell_dir = format!("{stem}_cell_{:03}", cell + 1);
                std::fs::create_dir_all(dir.join(&cell_dir))
                    .with_context(|| format!("create '{}'", dir.join(&cell_dir).display()))?;
                for (fi, frame) in frames.iter().enumerate() {
                    let rel = format!("{cell_dir}/frame_{fi:03}.png");
                    write_file(dir, &rel, &frame.tiles[cell].png)?;
                    files.push(rel);
                }
            }
            cells
        }
    };

    let manifest = PackManifest {
        name: stem,
        kind: set.kind().to_string(),
        grid: grid.to_string(),
        emoji_count,
        files,
        created_at: unix_secs(SystemTime::now()),
        size: format!("{EMOJI_SIZE}x{EMOJI_SIZE}"),
    };
    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| GridmojiError::processing(format!("serialize pack manifest: {e}")))?;
    write_file(dir, "pack.json", &json)?;
    tracing::info!(
        dir = %dir.display(),
        kind = %manifest.kind,
        emojis = manifest.emoji_count,
        files = manifest.files.len(),
        "pack written"
    );
    Ok(manifest)
}

/// Zip a pack written by [`write_pack`] into `archive`, adding a `README.txt`.
///
/// Entries keep their paths relative to `dir`. A partially written archive is removed on failure.
pub fn write_pack_archive(
    dir: &Path,
    manifest: &PackManifest,
    archive: &Path,
) -> GridmojiResult<()> {
    if let Some(parent) = archive.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create '{}'", parent.display()))?;
    }
    let result = zip_pack(dir, manifest, archive);
    if result.is_err() {
        let _ = std::fs::remove_file(archive);
    }
    result?;
    tracing::info!(
        archive = %archive.display(),
        entries = manifest.files.len() + 2,
        "pack archive written"
    );
    Ok(())
}

fn zip_pack(dir: &Path, manifest: &PackManifest, archive: &Path) -> GridmojiResult<()> {
    let file = std::fs::File::create(archive)
        .with_context(|| format!("create '{}'", archive.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for rel in manifest.files.iter().map(String::as_str).chain(["pack.json"]) {
        let bytes =
            std::fs::read(dir.join(rel)).with_context(|| format!("read pack file '{rel}'"))?;
        zip.start_file(rel, opts)
            .with_context(|| format!("add '{rel}' to archive"))?;
        zip.write_all(&bytes)
            .with_context(|| format!("add '{rel}' to archive"))?;
    }
    zip.start_file("README.txt", opts)
        .context("add README.txt to archive")?;
    zip.write_all(pack_readme(manifest).as_bytes())
        .context("add README.txt to archive")?;
    zip.finish().context("finish archive")?;
    Ok(())
}

fn pack_readme(manifest: &PackManifest) -> String {
    let unit = match manifest.kind.as_str() {
        "video" => "animated emoji cells",
        _ => "emoji images",
    };
    let mut out = format!(
        "# {} Emoji Pack\n\nThis pack contains {} {unit} on a {} grid, {} pixels each.\n\n\
         ## Usage\nExtract the PNG files and upload them as custom emoji.\n\n## Files\n",
        manifest.name, manifest.emoji_count, manifest.grid, manifest.size
    );
    for f in &manifest.files {
        out.push_str("- ");
        out.push_str(f);
        out.push('\n');
    }
    out
}

fn write_file(dir: &Path, rel: &str, bytes: &[u8]) -> GridmojiResult<()> {
    let path = dir.join(rel);
    std::fs::write(&path, bytes).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/export.rs"]
mod tests;
