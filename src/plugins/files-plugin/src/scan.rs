use path_clean::PathClean;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tunehub_core::Media;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    Audio,
}

/// One item of a listing or search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    /// Path relative to the library root, `/`-separated.
    pub path: String,
    pub kind: EntryKind,
    /// What to hand to the playlist for audio files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
}

pub fn is_supported_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "mp3" | "m4a" | "flac" | "wav" | "ogg" | "opus"
    )
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(is_supported_extension)
}

/// Resolve `relative` under `root`, refusing anything that escapes it.
pub fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let root = root.canonicalize().ok()?.clean();
    let joined = root.join(relative.trim_start_matches('/')).clean();
    let canonical = joined.canonicalize().ok()?.clean();
    canonical.starts_with(&root).then_some(canonical)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn entry_for(root: &Path, path: &Path, player_id: &str) -> Option<Entry> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let relative = relative_path(root, path)?;
    if path.is_dir() {
        return Some(Entry {
            name,
            path: relative,
            kind: EntryKind::Directory,
            media: None,
        });
    }
    if !is_audio(path) {
        return None;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    Some(Entry {
        name,
        path: relative,
        kind: EntryKind::Audio,
        media: Some(Media::new(player_id, path.to_string_lossy()).with_name(stem)),
    })
}

/// List one directory: sub-directories first, then audio files, each by name.
pub fn list_dir(root: &Path, relative: &str, player_id: &str) -> std::io::Result<Vec<Entry>> {
    let root = root.canonicalize()?.clean();
    let dir = resolve(&root, relative).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{relative:?} is not inside the library"),
        )
    })?;
    let mut entries: Vec<Entry> = std::fs::read_dir(&dir)?
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| entry_for(&root, &entry.path(), player_id))
        .collect();
    entries.sort_by(|a, b| {
        (a.kind != EntryKind::Directory, &a.name).cmp(&(b.kind != EntryKind::Directory, &b.name))
    });
    Ok(entries)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Walk the whole library for audio files whose relative path contains
/// `query`, case-insensitively. `keep_going` is polled between files.
pub fn search<F>(
    root: &Path,
    query: &str,
    limit: usize,
    player_id: &str,
    mut keep_going: F,
) -> Vec<Entry>
where
    F: FnMut() -> bool,
{
    let Ok(root) = root.canonicalize().map(|root| root.clean()) else {
        return Vec::new();
    };
    let needle = query.to_lowercase();
    let mut found = Vec::new();
    let walk = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));
    for entry in walk {
        if found.len() >= limit || !keep_going() {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_audio(entry.path()) {
            continue;
        }
        let Some(relative) = relative_path(&root, entry.path()) else {
            continue;
        };
        if relative.to_lowercase().contains(&needle) {
            if let Some(hit) = entry_for(&root, entry.path(), player_id) {
                found.push(hit);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Artist").join("Album");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join("01 Intro.flac"), b"x").unwrap();
        std::fs::write(album.join("02 Song.MP3"), b"x").unwrap();
        std::fs::write(album.join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("loose.ogg"), b"x").unwrap();
        std::fs::write(dir.path().join(".hidden.mp3"), b"x").unwrap();
        dir
    }

    #[test]
    fn lists_directories_before_files() {
        let lib = library();
        let entries = list_dir(lib.path(), "", "p").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Artist", "loose.ogg"]);
        assert_eq!(entries[1].media.as_ref().unwrap().name.as_deref(), Some("loose"));

        let album = list_dir(lib.path(), "Artist/Album", "p").unwrap();
        let paths: Vec<_> = album.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Artist/Album/01 Intro.flac", "Artist/Album/02 Song.MP3"]);
    }

    #[test]
    fn refuses_paths_outside_root() {
        let lib = library();
        assert!(resolve(lib.path(), "../").is_none());
        assert!(list_dir(lib.path(), "Artist/../../", "p").is_err());
        assert!(resolve(lib.path(), "/Artist").is_some());
    }

    #[test]
    fn search_matches_paths_and_stops_early() {
        let lib = library();
        let hits = search(lib.path(), "song", 10, "p", || true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "02 Song.MP3");
        assert_eq!(hits[0].media.as_ref().unwrap().player_id, "p");

        assert_eq!(search(lib.path(), "", 10, "p", || true).len(), 3);
        assert_eq!(search(lib.path(), "", 1, "p", || true).len(), 1);
        assert!(search(lib.path(), "", 10, "p", || false).is_empty());
    }
}
