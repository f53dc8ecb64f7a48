use lofty::{Accessor, AudioFile, Probe, TaggedFileExt};
use std::path::Path;
use tunehub_core::Tags;

/// Asset id under which a file's cover art is resolved.
pub const COVER_ASSET: &str = "cover";

const COVER_NAMES: &[&str] = &["cover.jpg", "cover.png", "folder.jpg", "folder.png", "front.jpg"];

#[derive(Debug, Clone, Default)]
pub struct ParsedTags {
    pub tags: Tags,
    pub duration_ms: Option<u32>,
}

/// Read the embedded tags of `path`. Unreadable files yield empty tags.
pub fn read_tags(path: &Path) -> ParsedTags {
    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(tagged) => tagged,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "no readable tags");
            return ParsedTags {
                tags: Tags {
                    cover: find_cover(path).map(|_| COVER_ASSET.to_string()),
                    ..Tags::default()
                },
                duration_ms: None,
            };
        }
    };

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    let duration_ms = u32::try_from(tagged.properties().duration().as_millis()).ok();
    let tags = Tags {
        title: tag.and_then(|t| t.title().map(|s| s.to_string())),
        artist: tag.and_then(|t| t.artist().map(|s| s.to_string())),
        album: tag.and_then(|t| t.album().map(|s| s.to_string())),
        genre: tag.and_then(|t| t.genre().map(|s| s.to_string())),
        track: tag.and_then(|t| t.track()),
        total_tracks: tag.and_then(|t| t.track_total()),
        cover: find_cover(path).map(|_| COVER_ASSET.to_string()),
    };
    ParsedTags { tags, duration_ms }
}

/// Cover image sitting next to `path`, if any.
pub fn find_cover(path: &Path) -> Option<std::path::PathBuf> {
    let dir = path.parent()?;
    COVER_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}
