//! # Embedded Tag Reading
//!
//! Pulls the fields the resolver needs (lyrics, artist, title, album,
//! duration) out of an audio file with `lofty`. Each tag format names its
//! fields differently, so reading goes through a per-dialect
//! [`DialectReader`] that knows which keys to consult for the artist.
//!
//! Reading never fails: unreadable or unsupported files yield an empty
//! [`AudioTags`] and resolution continues with the next tier.

use async_trait::async_trait;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag, TagType};
use std::io::Cursor;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Fields read from an audio file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioTags {
    pub embedded_lyrics: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub duration_sec: Option<f64>,
}

impl AudioTags {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `(artist, title)` when both are known, which cache lookups need.
    pub fn identity(&self) -> Option<(&str, &str)> {
        Some((self.artist.as_deref()?, self.title.as_deref()?))
    }

    /// Fill fields still missing here from `other`.
    fn merge_missing(&mut self, other: AudioTags) {
        self.embedded_lyrics = self.embedded_lyrics.take().or(other.embedded_lyrics);
        self.artist = self.artist.take().or(other.artist);
        self.title = self.title.take().or(other.title);
        self.album = self.album.take().or(other.album);
    }
}

#[async_trait]
pub trait TagReader: Send + Sync {
    async fn read_tags(&self, path: &Path) -> AudioTags;
}

/// Tag format families with distinct key conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDialect {
    Id3v2,
    Vorbis,
    Mp4,
    Ape,
    Other,
}

impl TagDialect {
    pub fn detect(tag_type: TagType) -> Self {
        match tag_type {
            TagType::Id3v2 => TagDialect::Id3v2,
            TagType::VorbisComments => TagDialect::Vorbis,
            TagType::Mp4Ilst => TagDialect::Mp4,
            TagType::Ape => TagDialect::Ape,
            _ => TagDialect::Other,
        }
    }

    pub fn reader(self) -> &'static dyn DialectReader {
        match self {
            TagDialect::Id3v2 => &Id3v2Reader,
            TagDialect::Vorbis => &VorbisReader,
            TagDialect::Mp4 => &Mp4Reader,
            TagDialect::Ape => &ApeReader,
            TagDialect::Other => &GenericReader,
        }
    }
}

/// Reads [`AudioTags`] from one tag of a known dialect.
pub trait DialectReader: Send + Sync {
    /// Keys consulted for the artist, most specific first.
    fn artist_keys(&self) -> Vec<ItemKey>;

    fn read(&self, tag: &Tag) -> AudioTags {
        let artist = self
            .artist_keys()
            .iter()
            .find_map(|key| joined_strings(tag, key));

        AudioTags {
            embedded_lyrics: read_lyrics(tag),
            artist,
            title: joined_strings(tag, &ItemKey::TrackTitle),
            album: joined_strings(tag, &ItemKey::AlbumTitle),
            duration_sec: None,
        }
    }
}

struct Id3v2Reader;
struct VorbisReader;
struct Mp4Reader;
struct ApeReader;
struct GenericReader;

impl DialectReader for Id3v2Reader {
    fn artist_keys(&self) -> Vec<ItemKey> {
        vec![
            ItemKey::TrackArtist,
            ItemKey::AlbumArtist,
            ItemKey::OriginalArtist,
            ItemKey::Performer,
        ]
    }
}

impl DialectReader for VorbisReader {
    fn artist_keys(&self) -> Vec<ItemKey> {
        vec![
            ItemKey::TrackArtist,
            ItemKey::AlbumArtist,
            ItemKey::Performer,
            ItemKey::Unknown("ARTISTS".to_string()),
        ]
    }
}

impl DialectReader for Mp4Reader {
    fn artist_keys(&self) -> Vec<ItemKey> {
        vec![ItemKey::TrackArtist, ItemKey::AlbumArtist]
    }
}

impl DialectReader for ApeReader {
    fn artist_keys(&self) -> Vec<ItemKey> {
        vec![ItemKey::TrackArtist, ItemKey::AlbumArtist, ItemKey::Performer]
    }
}

impl DialectReader for GenericReader {
    fn artist_keys(&self) -> Vec<ItemKey> {
        vec![ItemKey::TrackArtist, ItemKey::AlbumArtist]
    }
}

/// Multi-valued fields are trimmed and joined with newlines.
fn joined_strings(tag: &Tag, key: &ItemKey) -> Option<String> {
    let values: Vec<&str> = tag
        .get_strings(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join("\n"))
    }
}

/// The lyrics field, or failing that any text item whose native key
/// mentions lyrics (e.g. `UNSYNCEDLYRICS`).
fn read_lyrics(tag: &Tag) -> Option<String> {
    if let Some(lyrics) = joined_strings(tag, &ItemKey::Lyrics) {
        return Some(lyrics);
    }

    let tag_type = tag.tag_type();
    tag.items()
        .filter(|item| key_name(item.key(), tag_type).to_lowercase().contains("lyric"))
        .filter_map(|item| item.value().text())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn key_name(key: &ItemKey, tag_type: TagType) -> String {
    match key {
        ItemKey::Unknown(name) => name.clone(),
        other => other
            .map_key(tag_type, true)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", other)),
    }
}

/// Read every tag, primary first; the first non-empty value per field wins.
pub fn read_from_tags<'a>(
    primary: Option<&'a Tag>,
    all: impl IntoIterator<Item = &'a Tag>,
) -> AudioTags {
    let mut tags = AudioTags::default();
    let primary_type = primary.map(Tag::tag_type);

    if let Some(tag) = primary {
        tags = TagDialect::detect(tag.tag_type()).reader().read(tag);
    }

    for tag in all {
        if Some(tag.tag_type()) == primary_type {
            continue;
        }
        let other = TagDialect::detect(tag.tag_type()).reader().read(tag);
        tags.merge_missing(other);
    }

    tags
}

/// [`TagReader`] backed by `lofty`.
#[derive(Debug, Default, Clone)]
pub struct LoftyTagReader;

impl LoftyTagReader {
    pub fn new() -> Self {
        Self
    }

    fn parse(data: &[u8]) -> lofty::error::Result<AudioTags> {
        let tagged_file = Probe::new(Cursor::new(data)).guess_file_type()?.read()?;

        let mut tags = read_from_tags(tagged_file.primary_tag(), tagged_file.tags());
        let duration = tagged_file.properties().duration().as_secs_f64();
        tags.duration_sec = (duration > 0.0).then_some(duration);
        Ok(tags)
    }
}

#[async_trait]
impl TagReader for LoftyTagReader {
    async fn read_tags(&self, path: &Path) -> AudioTags {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Audio file unreadable, continuing without tags");
                return AudioTags::default();
            }
        };

        match Self::parse(&data) {
            Ok(tags) => tags,
            Err(e) => {
                debug!(error = %e, "Audio tags unparseable, continuing without tags");
                AudioTags::default()
            }
        }
    }
}
