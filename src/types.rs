use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Translation {
    Sub,
    Dub,
    Raw,
}

impl Translation {
    pub fn as_str(self) -> &'static str {
        match self {
            Translation::Sub => "sub",
            Translation::Dub => "dub",
            Translation::Raw => "raw",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sub" => Some(Translation::Sub),
            "dub" => Some(Translation::Dub),
            "raw" => Some(Translation::Raw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    #[default]
    Unknown,
    Ongoing,
    Completed,
    Licensed,
    PublishingFinished,
    Cancelled,
    OnHiatus,
}

/// An anime or manga entry as listed by a source.
///
/// `url` is whatever the source needs to find the entry again: a path
/// relative to the site root for scraped sites, or an API id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub url: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub status: SeriesStatus,
}

impl Series {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeriesPage {
    pub items: Vec<Series>,
    pub has_next_page: bool,
}

impl SeriesPage {
    pub fn new(items: Vec<Series>, has_next_page: bool) -> Self {
        Self {
            items,
            has_next_page,
        }
    }

    pub fn single(item: Series) -> Self {
        Self::new(vec![item], false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    pub url: String,
    pub name: String,
    pub number: f32,
    pub date_upload: Option<DateTime<Utc>>,
    pub scanlator: Option<String>,
}

impl Episode {
    pub fn new(url: impl Into<String>, name: impl Into<String>, number: f32) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            number,
            date_upload: None,
            scanlator: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub url: String,
    pub name: String,
    /// `-1.0` when the site gives no usable number.
    pub number: f32,
    pub date_upload: Option<DateTime<Utc>>,
    pub scanlator: Option<String>,
}

impl Chapter {
    pub fn new(url: impl Into<String>, name: impl Into<String>, number: f32) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            number,
            date_upload: None,
            scanlator: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub url: String,
    pub lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    /// Page the video was resolved from.
    pub url: String,
    pub quality: String,
    pub video_url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub subtitles: Vec<Track>,
}

impl Video {
    pub fn new(
        url: impl Into<String>,
        quality: impl Into<String>,
        video_url: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            quality: quality.into(),
            video_url: video_url.into(),
            headers: HashMap::new(),
            subtitles: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub index: usize,
    /// Reader page that still has to be resolved to an image, often empty.
    pub url: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Page {
    pub fn image(index: usize, image_url: impl Into<String>) -> Self {
        Self {
            index,
            url: String::new(),
            image_url: Some(image_url.into()),
            headers: HashMap::new(),
        }
    }
}
