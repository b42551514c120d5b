use std::{fmt::Display, str::FromStr, time::Duration};

#[derive(Default, Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub original_filename: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
}

#[derive(Default, Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TrackList {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub has_next: bool,
}

/// A named collection of tracks. The backend calls these both "crates" and
/// "playlists"; both spellings deserialize into this one type.
#[derive(Default, Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Crate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Default, Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CrateList {
    #[serde(default, alias = "playlists")]
    pub crates: Vec<Crate>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub has_next: bool,
}

/// Which collection a refill pulls tracks from.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum Context {
    #[default]
    All,
    Unsorted,
    Crate(String),
}

impl Context {
    /// Value of the `playlist_id` filter understood by the track listing
    /// endpoint. `All` is expressed by leaving the filter out.
    pub fn playlist_id(&self) -> Option<&str> {
        match self {
            Context::All => None,
            Context::Unsorted => Some("unsorted"),
            Context::Crate(id) => Some(id.as_str()),
        }
    }
}

impl FromStr for Context {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "" | "all" => Context::All,
            "unsorted" => Context::Unsorted,
            id => Context::Crate(id.to_string()),
        })
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Context::All => f.write_str("all"),
            Context::Unsorted => f.write_str("unsorted"),
            Context::Crate(id) => f.write_str(id),
        }
    }
}

/// One playable entry of the queue. Entries are never edited once queued.
#[derive(Default, Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct QueueItem {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub filename: Option<String>,
    pub stream_url: String,
    /// Duration reported by the library. Takes precedence over whatever the
    /// decoder discovers.
    pub duration: Option<Duration>,
}

impl QueueItem {
    pub fn from_track(track: Track, stream_url: String) -> Self {
        let duration = track
            .duration_seconds
            .filter(|seconds| *seconds > 0.0)
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok());

        Self {
            id: track.id,
            title: track.title.filter(|t| !t.trim().is_empty()),
            artist: track.artist.filter(|a| !a.trim().is_empty()),
            filename: Some(track.original_filename).filter(|f| !f.is_empty()),
            stream_url,
            duration,
        }
    }

    pub fn label(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }

        match &self.filename {
            Some(filename) => match filename.rsplit_once('.') {
                Some((stem, _)) if !stem.is_empty() => stem.to_string(),
                _ => filename.clone(),
            },
            None => self.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            original_filename: "Some Song.mp3".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn context_round_trips_through_strings() {
        assert_eq!("all".parse::<Context>().unwrap(), Context::All);
        assert_eq!("unsorted".parse::<Context>().unwrap(), Context::Unsorted);
        assert_eq!(
            "b1c2".parse::<Context>().unwrap(),
            Context::Crate("b1c2".to_string())
        );
        assert_eq!(Context::Crate("b1c2".to_string()).to_string(), "b1c2");
    }

    #[test]
    fn context_maps_to_playlist_filter() {
        assert_eq!(Context::All.playlist_id(), None);
        assert_eq!(Context::Unsorted.playlist_id(), Some("unsorted"));
        assert_eq!(Context::Crate("x".into()).playlist_id(), Some("x"));
    }

    #[test]
    fn label_falls_back_to_filename_stem() {
        let item = QueueItem::from_track(track("a"), "url".to_string());
        assert_eq!(item.label(), "Some Song");

        let mut titled = track("b");
        titled.title = Some("Real Title".to_string());
        let item = QueueItem::from_track(titled, "url".to_string());
        assert_eq!(item.label(), "Real Title");
    }

    #[test]
    fn only_positive_durations_are_authoritative() {
        let mut with_duration = track("a");
        with_duration.duration_seconds = Some(183.5);
        let item = QueueItem::from_track(with_duration, String::new());
        assert_eq!(item.duration, Some(Duration::from_secs_f64(183.5)));

        let mut zero = track("b");
        zero.duration_seconds = Some(0.0);
        assert_eq!(QueueItem::from_track(zero, String::new()).duration, None);
    }

    #[test]
    fn unrepresentable_durations_are_dropped() {
        for seconds in [1e20, f64::INFINITY, f64::NAN] {
            let mut huge = track("a");
            huge.duration_seconds = Some(seconds);
            assert_eq!(QueueItem::from_track(huge, String::new()).duration, None);
        }
    }

    #[test]
    fn crate_list_accepts_playlist_key() {
        let json = r#"{"playlists":[{"id":"1","name":"Digging"}],"total":1,"has_next":false}"#;
        let list: CrateList = serde_json::from_str(json).unwrap();
        assert_eq!(list.crates.len(), 1);
        assert_eq!(list.crates[0].name, "Digging");
    }
}
