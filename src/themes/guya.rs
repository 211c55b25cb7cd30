//! Guya, a JSON reader API (`/api/get_all_series/`, `/api/series/{slug}/`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::SLUG_PREFIX;
use crate::dates;
use crate::error::{Result, SourceError};
use crate::filters::FilterList;
use crate::providers::{MangaSource, SourceContext, SourceInfo};
use crate::types::{Chapter, Page, Series, SeriesPage};

#[derive(Debug, Clone)]
pub struct GuyaConfig {
    pub name: &'static str,
    pub lang: &'static str,
    pub base_url: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesSummary {
    pub slug: String,
    #[serde(default)]
    pub cover: String,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesDetail {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: String,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub chapters: BTreeMap<String, ChapterEntry>,
    /// Group id to group name.
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
    #[serde(default)]
    pub preferred_sort: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub folder: String,
    /// Group id to page file names.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub release_date: BTreeMap<String, i64>,
    #[serde(default)]
    pub preferred_sort: Option<Vec<String>>,
}

pub struct Guya {
    info: SourceInfo,
    ctx: SourceContext,
}

impl Guya {
    pub fn new(config: GuyaConfig, ctx: SourceContext) -> Self {
        let base_url = ctx.base_url(config.name, config.base_url);
        Self {
            info: SourceInfo::new(config.name, config.lang, &base_url, false),
            ctx,
        }
    }

    fn base(&self) -> &str {
        &self.info.base_url
    }

    async fn all_series(&self) -> Result<BTreeMap<String, SeriesSummary>> {
        let url = format!("{}/api/get_all_series/", self.base());
        self.ctx.http.fetch_json(self.ctx.http.get(&url)).await
    }

    async fn series(&self, slug: &str) -> Result<SeriesDetail> {
        let url = format!("{}/api/series/{slug}/", self.base());
        self.ctx.http.fetch_json(self.ctx.http.get(&url)).await
    }

    fn preferred_group(&self) -> Option<String> {
        self.ctx.prefs(&self.info.name).preferred_scanlator
    }
}

#[async_trait]
impl MangaSource for Guya {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, _page: u32) -> Result<SeriesPage> {
        let all = self.all_series().await?;
        Ok(listing(all, self.base(), |_, _| true))
    }

    async fn search(&self, _page: u32, query: &str, _filters: &FilterList) -> Result<SeriesPage> {
        let all = self.all_series().await?;
        if let Some(slug) = query.strip_prefix(SLUG_PREFIX) {
            let slug = slug.trim();
            return Ok(listing(all, self.base(), |_, summary| summary.slug == slug));
        }
        let needle = query.trim().to_lowercase();
        Ok(listing(all, self.base(), |title, _| {
            title.to_lowercase().contains(&needle)
        }))
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let detail = self.series(&series.url).await?;
        let title = if series.title.is_empty() {
            detail.title.clone()
        } else {
            series.title.clone()
        };
        Ok(to_series(
            &title,
            &detail.slug,
            &detail.cover,
            detail.author.as_deref(),
            detail.artist.as_deref(),
            detail.description.as_deref(),
            self.base(),
        ))
    }

    async fn chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        let detail = self.series(&series.url).await?;
        Ok(chapter_list(&detail, self.preferred_group().as_deref()))
    }

    async fn pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        let (slug, number, group) = split_chapter_url(&chapter.url)?;
        debug!(slug, number, group, "loading guya pages");
        let detail = self.series(slug).await?;
        page_list(&detail, number, group, self.base())
    }

    fn filters(&self) -> FilterList {
        FilterList::empty()
    }
}

fn to_series(
    title: &str,
    slug: &str,
    cover: &str,
    author: Option<&str>,
    artist: Option<&str>,
    description: Option<&str>,
    base_url: &str,
) -> Series {
    let mut series = Series::new(slug, title);
    series.author = Some(author.unwrap_or("Unknown").to_string());
    series.artist = Some(artist.unwrap_or("Unknown").to_string());
    series.description = Some(description.unwrap_or("None").to_string());
    series.thumbnail_url = Some(if cover.starts_with("http") {
        cover.to_string()
    } else {
        format!("{base_url}/{}", cover.trim_start_matches('/'))
    });
    series
}

/// Every series matching `keep`, keyed by title. The API has no paging.
pub fn listing<F>(all: BTreeMap<String, SeriesSummary>, base_url: &str, keep: F) -> SeriesPage
where
    F: Fn(&str, &SeriesSummary) -> bool,
{
    let items = all
        .iter()
        .filter(|(title, summary)| keep(title, summary))
        .map(|(title, s)| {
            to_series(
                title,
                &s.slug,
                &s.cover,
                s.author.as_deref(),
                s.artist.as_deref(),
                s.description.as_deref(),
                base_url,
            )
        })
        .collect();
    SeriesPage::new(items, false)
}

/// Group to read a chapter from: the configured group (by id or name), then
/// the first ranked group that has the chapter, then any group.
pub fn best_group<'a>(
    chapter: &'a ChapterEntry,
    sort: &[String],
    groups: &BTreeMap<String, String>,
    preferred: Option<&str>,
) -> Option<&'a str> {
    if let Some(preferred) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
        let by_name = groups
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(preferred))
            .map(|(id, _)| id.as_str());
        for wanted in [Some(preferred), by_name].into_iter().flatten() {
            if let Some((id, _)) = chapter.groups.get_key_value(wanted) {
                return Some(id.as_str());
            }
        }
    }
    sort.iter()
        .find_map(|id| chapter.groups.get_key_value(id.as_str()))
        .or_else(|| chapter.groups.iter().next())
        .map(|(id, _)| id.as_str())
}

fn build_chapter(
    slug: &str,
    number: &str,
    entry: &ChapterEntry,
    group: &str,
    groups: &BTreeMap<String, String>,
) -> Chapter {
    let mut chapter = Chapter::new(
        format!("{slug}/{number}/{group}"),
        format!("{number} - {}", entry.title),
        number.parse().unwrap_or(-1.0),
    );
    chapter.scanlator = Some(groups.get(group).cloned().unwrap_or_else(|| group.to_string()));
    chapter.date_upload = entry
        .release_date
        .get(group)
        .copied()
        .and_then(dates::from_unix_seconds);
    chapter
}

/// Chapters newest first. With a ranking one chapter per number is emitted,
/// otherwise one per group.
pub fn chapter_list(detail: &SeriesDetail, preferred: Option<&str>) -> Vec<Chapter> {
    let mut chapters = Vec::new();
    for (number, entry) in &detail.chapters {
        let sort = entry
            .preferred_sort
            .as_deref()
            .or(detail.preferred_sort.as_deref());
        match sort {
            Some(sort) => {
                if let Some(group) = best_group(entry, sort, &detail.groups, preferred) {
                    chapters.push(build_chapter(&detail.slug, number, entry, group, &detail.groups));
                }
            }
            None => chapters.extend(
                entry
                    .groups
                    .keys()
                    .map(|group| build_chapter(&detail.slug, number, entry, group, &detail.groups)),
            ),
        }
    }
    // Keys are strings, so order by the parsed number.
    chapters.sort_by(|a, b| b.number.total_cmp(&a.number));
    chapters
}

/// Splits `{slug}/{chapter}/{group}`.
pub fn split_chapter_url(url: &str) -> Result<(&str, &str, &str)> {
    let mut parts = url.trim_matches('/').splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(slug), Some(number), Some(group)) if !slug.is_empty() => Ok((slug, number, group)),
        _ => Err(SourceError::parse(format!("malformed chapter url `{url}`"))),
    }
}

pub fn page_list(detail: &SeriesDetail, number: &str, group: &str, base_url: &str) -> Result<Vec<Page>> {
    let entry = detail
        .chapters
        .get(number)
        .ok_or_else(|| SourceError::not_found(format!("chapter {number}")))?;
    let files = entry
        .groups
        .get(group)
        .ok_or_else(|| SourceError::not_found(format!("group {group} of chapter {number}")))?;
    Ok(files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            Page::image(
                i + 1,
                format!(
                    "{base_url}/media/manga/{}/chapters/{}/{group}/{file}",
                    detail.slug, entry.folder
                ),
            )
        })
        .collect())
}
