use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::debug;

use super::{MangaSource, SourceContext, SourceInfo};
use crate::error::Result;
use crate::filters::{CheckBoxGroup, Filter, FilterList, SortSelection, options};
use crate::types::{Chapter, Page, Series, SeriesPage, SeriesStatus, Translation};

const MANGADEX_API_URL: &str = "https://api.mangadex.org";
const COVER_URL: &str = "https://uploads.mangadex.org/covers";
const LISTING_LIMIT: usize = 20;
const CHAPTER_PAGE_LIMIT: usize = 500;

pub struct MangaDex {
    info: SourceInfo,
    ctx: SourceContext,
}

impl MangaDex {
    pub fn new(ctx: SourceContext) -> Self {
        let api = ctx.base_url("MangaDex", MANGADEX_API_URL);
        Self {
            info: SourceInfo::new("MangaDex", "en", &api, true),
            ctx,
        }
    }

    fn api(&self) -> &str {
        &self.info.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.ctx.http.get(&format!("{}{path}", self.api()))
    }

    async fn listing(&self, page: u32, mut query: Vec<(String, String)>) -> Result<SeriesPage> {
        let offset = page.saturating_sub(1) as usize * LISTING_LIMIT;
        query.push(("limit".into(), LISTING_LIMIT.to_string()));
        query.push(("offset".into(), offset.to_string()));
        query.push(("includes[]".into(), "cover_art".into()));
        let response: MangaListResponse = self
            .ctx
            .http
            .fetch_json(self.get("/manga").query(&query))
            .await?;
        Ok(listing_page(response, offset))
    }

    fn languages(&self) -> &'static [&'static str] {
        let translation = self
            .ctx
            .prefs(&self.info.name)
            .translation
            .as_deref()
            .and_then(Translation::parse);
        match translation {
            Some(Translation::Raw) => &["ja"],
            _ => &["en"],
        }
    }

    async fn feed(&self, manga_id: &str, offset: usize) -> Result<MangaFeedResponse> {
        let mut query = vec![
            ("limit", CHAPTER_PAGE_LIMIT.to_string()),
            ("offset", offset.to_string()),
            ("order[chapter]", "desc".to_string()),
            ("includes[]", "scanlation_group".to_string()),
        ];
        for lang in self.languages() {
            query.push(("translatedLanguage[]", lang.to_string()));
        }
        self.ctx
            .http
            .fetch_json(self.get(&format!("/manga/{manga_id}/feed")).query(&query))
            .await
    }
}

const DEFAULT_ORDER: (&str, &str) = ("order[followedCount]", "desc");

/// Listing query for a search. A title query left on the default follow
/// order is ranked by relevance instead.
pub fn search_pairs(query: &str, filters: &FilterList) -> Vec<(String, String)> {
    let mut pairs = filters.query_pairs();
    let query = query.trim();
    if !query.is_empty() {
        for (key, value) in &mut pairs {
            if (key.as_str(), value.as_str()) == DEFAULT_ORDER {
                *key = "order[relevance]".to_string();
            }
        }
        pairs.push(("title".into(), query.to_string()));
    }
    pairs
}

#[async_trait]
impl MangaSource for MangaDex {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, page: u32) -> Result<SeriesPage> {
        self.listing(page, vec![(DEFAULT_ORDER.0.into(), DEFAULT_ORDER.1.into())])
            .await
    }

    async fn latest(&self, page: u32) -> Result<SeriesPage> {
        self.listing(page, vec![("order[latestUploadedChapter]".into(), "desc".into())])
            .await
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        self.listing(page, search_pairs(query, filters)).await
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let request = self
            .get(&format!("/manga/{}", series.url))
            .query(&[("includes[]", "author"), ("includes[]", "artist"), ("includes[]", "cover_art")]);
        let response: MangaResponse = self.ctx.http.fetch_json(request).await?;
        Ok(manga_details(response.data))
    }

    async fn chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        let mut chapters = Vec::new();
        let mut offset = 0;
        loop {
            let feed = self.feed(&series.url, offset).await?;
            let count = feed.data.len();
            chapters.extend(feed.data.into_iter().filter_map(feed_chapter));
            if count < CHAPTER_PAGE_LIMIT || (feed.total > 0 && offset + count >= feed.total) {
                break;
            }
            offset += CHAPTER_PAGE_LIMIT;
        }
        debug!(manga = %series.url, count = chapters.len(), "mangadex feed loaded");
        Ok(chapters)
    }

    async fn pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        let at_home: AtHomeResponse = self
            .ctx
            .http
            .fetch_json(self.get(&format!("/at-home/server/{}", chapter.url)))
            .await?;
        Ok(at_home_pages(at_home))
    }

    fn filters(&self) -> FilterList {
        FilterList::new(vec![
            Filter::sort(
                "order[{}]",
                "Sort",
                options(&[
                    ("Relevance", "relevance"),
                    ("Follows", "followedCount"),
                    ("Latest Upload", "latestUploadedChapter"),
                    ("Title", "title"),
                    ("Year", "year"),
                ]),
                Some(SortSelection {
                    index: 1,
                    ascending: false,
                }),
            ),
            Filter::CheckBoxGroup(CheckBoxGroup::new(
                "status[]",
                "Status",
                options(&[
                    ("Ongoing", "ongoing"),
                    ("Completed", "completed"),
                    ("Hiatus", "hiatus"),
                    ("Cancelled", "cancelled"),
                ]),
            )),
            Filter::CheckBoxGroup(CheckBoxGroup::new(
                "publicationDemographic[]",
                "Demographic",
                options(&[
                    ("Shounen", "shounen"),
                    ("Shoujo", "shoujo"),
                    ("Seinen", "seinen"),
                    ("Josei", "josei"),
                ]),
            )),
            Filter::CheckBoxGroup(CheckBoxGroup::new(
                "contentRating[]",
                "Content Rating",
                options(&[("Safe", "safe"), ("Suggestive", "suggestive")]),
            )),
            Filter::CheckBoxGroup(CheckBoxGroup::new(
                "originalLanguage[]",
                "Original Language",
                options(&[("Japanese", "ja"), ("Korean", "ko"), ("Chinese", "zh")]),
            )),
        ])
    }
}

fn localized(map: &HashMap<String, String>) -> Option<String> {
    map.get("en")
        .or_else(|| map.get("ja-ro"))
        .or_else(|| map.get("ja"))
        .or_else(|| map.values().next())
        .cloned()
}

pub fn parse_status(status: Option<&str>) -> SeriesStatus {
    match status {
        Some("ongoing") => SeriesStatus::Ongoing,
        Some("completed") => SeriesStatus::Completed,
        Some("hiatus") => SeriesStatus::OnHiatus,
        Some("cancelled") => SeriesStatus::Cancelled,
        _ => SeriesStatus::Unknown,
    }
}

fn summary(manga: &MangaData) -> Series {
    let title = localized(&manga.attributes.title).unwrap_or_else(|| "Unknown Title".to_string());
    let mut series = Series::new(manga.id.clone(), title);
    series.thumbnail_url = manga
        .relationship("cover_art")
        .and_then(|cover| cover.attributes.as_ref()?.file_name.as_deref())
        .map(|file| format!("{COVER_URL}/{}/{file}.256.jpg", manga.id));
    series
}

pub fn listing_page(response: MangaListResponse, offset: usize) -> SeriesPage {
    let items: Vec<Series> = response.data.iter().map(summary).collect();
    let has_next = offset + items.len() < response.total;
    SeriesPage::new(items, has_next)
}

pub fn manga_details(manga: MangaData) -> Series {
    let mut series = summary(&manga);
    let names = |kind: &str| {
        let names: Vec<&str> = manga
            .relationships
            .iter()
            .filter(|r| r.kind == kind)
            .filter_map(|r| r.attributes.as_ref()?.name.as_deref())
            .collect();
        (!names.is_empty()).then(|| names.join(", "))
    };
    series.author = names("author");
    series.artist = names("artist");
    series.description = localized(&manga.attributes.description);
    series.status = parse_status(manga.attributes.status.as_deref());
    series.genres = manga
        .attributes
        .tags
        .iter()
        .filter_map(|tag| localized(&tag.attributes.name))
        .collect();
    series
}

/// Chapters hosted off-site have no readable pages and are skipped.
pub fn feed_chapter(chapter: ChapterData) -> Option<Chapter> {
    let attrs = &chapter.attributes;
    if attrs.external_url.is_some() {
        return None;
    }
    let mut name = String::new();
    if let Some(volume) = &attrs.volume {
        name.push_str(&format!("Vol.{volume} "));
    }
    match &attrs.chapter {
        Some(number) => name.push_str(&format!("Ch.{number}")),
        None => name.push_str("Oneshot"),
    }
    if let Some(title) = attrs.title.as_deref().filter(|t| !t.is_empty()) {
        name.push_str(" - ");
        name.push_str(title);
    }
    let number = attrs
        .chapter
        .as_deref()
        .and_then(|n| n.parse().ok())
        .unwrap_or(-1.0);
    let mut out = Chapter::new(chapter.id.clone(), name, number);
    out.date_upload = attrs
        .publish_at
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc));
    out.scanlator = chapter
        .relationships
        .iter()
        .find(|r| r.kind == "scanlation_group")
        .and_then(|r| r.attributes.as_ref()?.name.clone());
    Some(out)
}

pub fn at_home_pages(at_home: AtHomeResponse) -> Vec<Page> {
    let base_url = at_home.base_url;
    let hash = at_home.chapter.hash;
    at_home
        .chapter
        .data
        .into_iter()
        .enumerate()
        .map(|(index, file)| Page::image(index, format!("{base_url}/data/{hash}/{file}")))
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct MangaListResponse {
    data: Vec<MangaData>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
pub struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

impl MangaData {
    fn relationship(&self, kind: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.kind == kind)
    }
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    description: HashMap<String, String>,
    status: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    attributes: TagAttributes,
}

#[derive(Debug, Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Deserialize)]
struct RelationshipAttributes {
    name: Option<String>,
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MangaFeedResponse {
    data: Vec<ChapterData>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    volume: Option<String>,
    chapter: Option<String>,
    title: Option<String>,
    #[serde(rename = "publishAt")]
    publish_at: Option<String>,
    #[serde(rename = "externalUrl")]
    external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AtHomeResponse {
    #[serde(rename = "baseUrl")]
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}
