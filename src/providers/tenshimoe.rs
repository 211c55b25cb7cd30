use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use scraper::ElementRef;
use tracing::debug;
use url::Url;

use super::{AnimeSource, SourceContext, SourceInfo};
use crate::dates;
use crate::error::{Result, SourceError};
use crate::extractors::generic;
use crate::filters::FilterList;
use crate::html;
use crate::http::Fetched;
use crate::quality::sort_videos;
use crate::themes::absolute;
use crate::types::{Episode, Series, SeriesPage, SeriesStatus, Video};

const TENSHI_BASE_URL: &str = "https://tenshi.moe";
const LIST_SELECTOR: &str = "ul.anime-loop.loop li a";
const NEXT_PAGE_SELECTOR: &str = "ul.pagination li.page-item a[rel=next]";
const EPISODE_SELECTOR: &str = "ul.episode-loop li a";
const DATE_FORMATS: &[&str] = &["%d %b, %Y"];
const DEFAULT_QUALITY: &str = "1080p";
/// Sorts a series page's episodes oldest first.
const EPISODE_SORT: &str = "?s=srt-d";
const MAX_EPISODE_PAGES: usize = 100;

pub struct TenshiMoe {
    info: SourceInfo,
    ctx: SourceContext,
}

impl TenshiMoe {
    pub fn new(ctx: SourceContext) -> Self {
        let base_url = ctx.base_url("tenshi.moe", TENSHI_BASE_URL);
        Self {
            info: SourceInfo::new("tenshi.moe", "en", &base_url, true),
            ctx,
        }
    }

    fn base(&self) -> &str {
        &self.info.base_url
    }

    async fn listing(&self, url: &str, search: bool) -> Result<SeriesPage> {
        let page = self.ctx.http.get_text(url).await?;
        Ok(parse_listing(&page.body, &page.url, search))
    }
}

#[async_trait]
impl AnimeSource for TenshiMoe {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, page: u32) -> Result<SeriesPage> {
        self.listing(&format!("{}/anime?s=vdy-d&page={page}", self.base()), false)
            .await
    }

    async fn latest(&self, page: u32) -> Result<SeriesPage> {
        self.listing(&format!("{}/anime?s=rel-d&page={page}", self.base()), false)
            .await
    }

    async fn search(&self, page: u32, query: &str, _filters: &FilterList) -> Result<SeriesPage> {
        let mut url = Url::parse(&format!("{}/anime", self.base()))?;
        url.query_pairs_mut()
            .append_pair("q", query.trim())
            .append_pair("page", &page.to_string());
        self.listing(url.as_str(), true).await
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let page = self
            .ctx
            .http
            .get_text(&absolute(self.base(), &series.url))
            .await?;
        parse_details(&page.body, &series.url)
    }

    async fn episodes(&self, series: &Series) -> Result<Vec<Episode>> {
        let http = &self.ctx.http;
        follow_episode_pages(absolute(self.base(), &series.url), |url| async move {
            http.get_text(&url).await
        })
        .await
    }

    async fn videos(&self, episode: &Episode) -> Result<Vec<Video>> {
        let page_url = absolute(self.base(), &episode.url);
        let page = self.ctx.http.get_text(&page_url).await?;
        let iframe = player_iframe(&page.body, &page.url)?;
        let player = self
            .ctx
            .http
            .fetch(self.ctx.http.get(&iframe).header("Referer", page.url.as_str()))
            .await?;
        let mut videos = generic::videos_from_player(&player.body, &player.url, "");
        let prefs = self.ctx.prefs(&self.info.name);
        let preferred = prefs.preferred_quality.as_deref().unwrap_or(DEFAULT_QUALITY);
        sort_videos(&mut videos, Some(preferred));
        Ok(videos)
    }
}

/// Card title without the badge spans.
fn card_title(link: ElementRef<'_>, search: bool) -> String {
    if search {
        return html::each_text(&html::select_all(link, "div span.thumb-title, div span.text-primary"))
            .join(" ");
    }
    let spans: Vec<ElementRef<'_>> = html::select_all(link, "div span")
        .into_iter()
        .filter(|span| !span.value().classes().any(|c| c == "badge"))
        .collect();
    html::each_text(&spans).join(" ")
}

pub fn parse_listing(body: &str, page_url: &str, search: bool) -> SeriesPage {
    let doc = html::parse(body);
    let root = doc.root_element();
    let items = html::select_all(root, LIST_SELECTOR)
        .into_iter()
        .filter_map(|link| {
            let href = html::abs_attr(link, "href", page_url)?;
            let mut series = Series::new(
                format!("{}{EPISODE_SORT}", html::url_without_domain(&href)),
                card_title(link, search),
            );
            series.thumbnail_url =
                html::select_first(link, "img").and_then(|img| html::image_url(img, page_url));
            Some(series)
        })
        .collect();
    SeriesPage::new(items, html::select_first(root, NEXT_PAGE_SELECTOR).is_some())
}

pub fn parse_status(value: &str) -> SeriesStatus {
    match value.trim() {
        "Ongoing" => SeriesStatus::Ongoing,
        "Completed" => SeriesStatus::Completed,
        _ => SeriesStatus::Unknown,
    }
}

pub fn parse_details(body: &str, url: &str) -> Result<Series> {
    let doc = html::parse(body);
    let root = doc.root_element();
    let title = html::text(html::require(root, "li.breadcrumb-item.active")?);
    let mut series = Series::new(url, title);
    series.thumbnail_url = html::select_first(root, "img.cover-image.img-thumbnail")
        .and_then(|img| html::attr(img, "src"))
        .map(str::to_string);
    series.genres = html::each_text(&html::select_all(root, "li.genre span.value"));
    series.description = html::select_first(root, "div.card-body").map(html::text);
    let production = html::each_text(&html::select_all(root, "li.production span.value"));
    series.author = (!production.is_empty()).then(|| production.join(", "));
    series.status = parse_status(
        &html::select_first(root, "li.status span.value")
            .map(html::text)
            .unwrap_or_default(),
    );
    Ok(series)
}

/// Episode number from the label, else from the `episodeN` class of the list item.
fn episode_number(link: ElementRef<'_>) -> f32 {
    let label = html::select_first(link, "div.episode-number")
        .map(html::text)
        .unwrap_or_default();
    if let Ok(number) = label.trim_start_matches("Episode ").trim().parse() {
        return number;
    }
    link.parent()
        .and_then(ElementRef::wrap)
        .and_then(|li| {
            li.value()
                .classes()
                .find_map(|c| c.strip_prefix("episode")?.parse().ok())
        })
        .unwrap_or(0.0)
}

/// One page of episodes and the link to the next one.
pub fn parse_episodes(body: &str, page_url: &str) -> (Vec<Episode>, Option<String>) {
    let doc = html::parse(body);
    let root = doc.root_element();
    let episodes = html::select_all(root, EPISODE_SELECTOR)
        .into_iter()
        .filter_map(|link| {
            let href = html::abs_attr(link, "href", page_url)?;
            let text_of = |css: &str| {
                html::select_first(link, css)
                    .map(html::text)
                    .unwrap_or_default()
            };
            let name = format!(
                "{}: {}{}",
                text_of("div.episode-number"),
                text_of("div.episode-label"),
                text_of("div.episode-title")
            );
            let mut episode = Episode::new(html::url_without_domain(&href), name, episode_number(link));
            episode.date_upload =
                dates::parse_date(&dates::strip_ordinals(&text_of("div.date")), DATE_FORMATS);
            Some(episode)
        })
        .collect();
    let next = html::select_first(root, NEXT_PAGE_SELECTOR).and_then(|a| html::abs_attr(a, "href", page_url));
    (episodes, next)
}

/// Walks the episode pages from `start` until there is no next link, the
/// next link points at a page already seen, or `MAX_EPISODE_PAGES` is hit.
pub async fn follow_episode_pages<F, Fut>(start: String, fetch: F) -> Result<Vec<Episode>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Fetched>>,
{
    let mut episodes = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut next = Some(start);
    while let Some(url) = next.take() {
        if visited.len() >= MAX_EPISODE_PAGES || !visited.insert(url.clone()) {
            debug!(%url, "stopping episode pagination");
            break;
        }
        let page = fetch(url.clone()).await?;
        visited.insert(page.url.clone());
        let (found, next_url) = parse_episodes(&page.body, &page.url);
        debug!(%url, count = found.len(), "tenshi episode page");
        episodes.extend(found);
        next = next_url;
    }
    Ok(episodes)
}

pub fn player_iframe(body: &str, page_url: &str) -> Result<String> {
    let doc = html::parse(body);
    html::select_first(doc.root_element(), "iframe")
        .and_then(|frame| html::abs_attr(frame, "src", page_url))
        .ok_or_else(|| SourceError::not_found("player iframe"))
}
