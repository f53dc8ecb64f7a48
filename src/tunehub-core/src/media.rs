use serde::{Deserialize, Serialize};

/// Metadata attached to a playing media.
///
/// Every field is optional. Merging keeps existing values for fields the
/// update leaves unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tracks: Option<u32>,
    /// Asset id of the cover art, resolved through the owning player.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl Tags {
    pub fn merge(&mut self, update: &Tags) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.title, &update.title);
        take(&mut self.artist, &update.artist);
        take(&mut self.album, &update.album);
        take(&mut self.genre, &update.genre);
        take(&mut self.track, &update.track);
        take(&mut self.total_tracks, &update.total_tracks);
        take(&mut self.cover, &update.cover);
    }

    pub fn is_empty(&self) -> bool {
        *self == Tags::default()
    }
}

/// A playable item: which player plays it, and the player-specific path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub player_id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl Media {
    pub fn new(player_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            path: path.into(),
            name: None,
            tags: Tags::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_unset_fields() {
        let mut tags = Tags {
            title: Some("Song".into()),
            artist: Some("Band".into()),
            ..Tags::default()
        };
        tags.merge(&Tags {
            artist: Some("Other".into()),
            track: Some(3),
            ..Tags::default()
        });
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.artist.as_deref(), Some("Other"));
        assert_eq!(tags.track, Some(3));
    }

    #[test]
    fn media_json_omits_empty_fields() {
        let media = Media::new("files", "/a.flac");
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json, serde_json::json!({ "player_id": "files", "path": "/a.flac" }));
        let back: Media = serde_json::from_value(json).unwrap();
        assert_eq!(back, media);
    }
}
