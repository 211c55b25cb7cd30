//! WPMangaReader, a WordPress manga theme with a filterable `/manga` directory.

use std::sync::{LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::RequestBuilder;
use scraper::ElementRef;
use tracing::{debug, warn};
use url::Url;

use super::{URL_PREFIX, absolute};
use crate::dates;
use crate::error::{Result, SourceError};
use crate::filters::{CheckBoxGroup, Filter, FilterList, FilterOption, Select, options};
use crate::html;
use crate::providers::{MangaSource, SourceContext, SourceInfo};
use crate::types::{Chapter, Page, Series, SeriesPage, SeriesStatus};

static IMAGES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""images.*?:.*?(\[.*?\])"#).expect("valid regex"));
static CHAPTER_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("valid regex"));

const LIST_ITEM_SELECTOR: &str = ".utao .uta .imgu, .listupd .bs .bsx, .listo .bs .bsx";
const NEXT_PAGE_SELECTOR: &str = "div.pagination .next, div.hpage .r";
const CHAPTER_SELECTOR: &str = "div.bxcl li, #chapterlist li .eph-num a";
const PAGE_SELECTOR: &str = "div#readerarea img";
const ALT_NAME_PREFIX: &str = "Alternative Name: ";

#[derive(Debug, Clone)]
pub struct WpMangaReaderConfig {
    pub name: &'static str,
    pub lang: &'static str,
    pub base_url: &'static str,
    pub manga_dir: &'static str,
    pub date_formats: &'static [&'static str],
}

impl WpMangaReaderConfig {
    pub fn new(name: &'static str, lang: &'static str, base_url: &'static str) -> Self {
        Self {
            name,
            lang,
            base_url,
            manga_dir: "/manga",
            date_formats: &["%B %d, %Y"],
        }
    }
}

pub struct WpMangaReader {
    info: SourceInfo,
    config: WpMangaReaderConfig,
    ctx: SourceContext,
    genres: RwLock<Option<Vec<FilterOption>>>,
}

impl WpMangaReader {
    pub fn new(config: WpMangaReaderConfig, ctx: SourceContext) -> Self {
        let base_url = ctx.base_url(config.name, config.base_url);
        Self {
            info: SourceInfo::new(config.name, config.lang, &base_url, true),
            config,
            ctx,
            genres: RwLock::new(None),
        }
    }

    fn base(&self) -> &str {
        &self.info.base_url
    }

    fn request(&self, url: &str) -> RequestBuilder {
        self.ctx.http.get(url).header("Referer", format!("{}/", self.base()))
    }

    async fn directory(&self, page: u32, pairs: Vec<(String, String)>) -> Result<SeriesPage> {
        let mut url = Url::parse(&format!("{}{}/", self.base(), self.config.manga_dir))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.to_string());
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
        }
        self.listing(url.as_str()).await
    }

    async fn listing(&self, url: &str) -> Result<SeriesPage> {
        let page = self.ctx.http.fetch(self.request(url)).await?;
        if self.cached_genres().is_none() {
            let genres = parse_genres(&page.body);
            if !genres.is_empty() {
                if let Ok(mut cache) = self.genres.write() {
                    *cache = Some(genres);
                }
            }
        }
        Ok(parse_listing(&page.body, &page.url))
    }

    fn cached_genres(&self) -> Option<Vec<FilterOption>> {
        self.genres.read().ok().and_then(|cache| cache.clone())
    }

    /// Series id for a pasted site URL. Chapter URLs are resolved through
    /// their breadcrumb.
    async fn manga_id_from_url(&self, raw: &str) -> Result<Option<String>> {
        let Ok(url) = Url::parse(raw.trim()) else {
            return Ok(None);
        };
        match classify_url(&url, self.base(), self.config.manga_dir) {
            UrlKind::Series(id) => Ok(Some(id)),
            UrlKind::MaybeChapter => {
                let page = self.ctx.http.fetch(self.request(url.as_str())).await?;
                Ok(series_id_from_breadcrumb(&page.body))
            }
            UrlKind::Other => Ok(None),
        }
    }
}

#[async_trait]
impl MangaSource for WpMangaReader {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, page: u32) -> Result<SeriesPage> {
        self.directory(page, vec![("order".to_string(), "popular".to_string())])
            .await
    }

    async fn latest(&self, page: u32) -> Result<SeriesPage> {
        self.directory(page, vec![("order".to_string(), "update".to_string())])
            .await
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        if let Some(raw) = query.strip_prefix(URL_PREFIX) {
            let Some(id) = self.manga_id_from_url(raw).await? else {
                debug!(url = raw, "url does not point at a series");
                return Ok(SeriesPage::default());
            };
            let url = format!("{}/{id}", self.config.manga_dir);
            let mut series = self.details(&Series::new(url.clone(), "")).await?;
            series.url = url;
            return Ok(SeriesPage::single(series));
        }
        if query.trim().is_empty() {
            return self.directory(page, filters.query_pairs()).await;
        }
        let mut url = Url::parse(&format!("{}/page/{page}/", self.base()))?;
        url.query_pairs_mut().append_pair("s", query.trim());
        self.listing(url.as_str()).await
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let page = self
            .ctx
            .http
            .fetch(self.request(&absolute(self.base(), &series.url)))
            .await?;
        parse_details(&page.body, &page.url)
    }

    async fn chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        let page = self
            .ctx
            .http
            .fetch(self.request(&absolute(self.base(), &series.url)))
            .await?;
        Ok(parse_chapters(
            &page.body,
            &page.url,
            self.config.lang,
            self.config.date_formats,
        ))
    }

    async fn pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        let page = self
            .ctx
            .http
            .fetch(self.request(&absolute(self.base(), &chapter.url)))
            .await?;
        parse_pages(&page.body, &page.url)
    }

    fn filters(&self) -> FilterList {
        let mut filters = vec![Filter::header("NOTE: Ignored if using text search!")];
        match self.cached_genres() {
            Some(genres) => {
                filters.push(Filter::CheckBoxGroup(CheckBoxGroup::new("genre[]", "Genre", genres)))
            }
            None => filters.push(Filter::header("Genres show up after the first listing")),
        }
        filters.push(Filter::Select(Select::new(
            "status",
            "Status",
            options(&[
                ("All", ""),
                ("Ongoing", "ongoing"),
                ("Completed", "completed"),
                ("Hiatus", "hiatus"),
            ]),
        )));
        filters.push(Filter::Select(Select::new(
            "type",
            "Type",
            options(&[
                ("All", ""),
                ("Manga", "manga"),
                ("Manhwa", "manhwa"),
                ("Manhua", "manhua"),
                ("Comic", "comic"),
            ]),
        )));
        filters.push(Filter::Select(Select::new(
            "order",
            "Order By",
            options(&[
                ("Default", ""),
                ("A-Z", "title"),
                ("Z-A", "titlereverse"),
                ("Update", "update"),
                ("Added", "latest"),
                ("Popular", "popular"),
            ]),
        )));
        FilterList::new(filters)
    }

    async fn refresh_filters(&self) -> Result<()> {
        if self.cached_genres().is_none() {
            if let Err(err) = self.popular(1).await {
                warn!(source = self.config.name, error = %err, "could not fetch genres");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    Series(String),
    /// A single path segment, usually a chapter.
    MaybeChapter,
    Other,
}

/// Recognizes `{base}{dir}/{id}[/]` series URLs and single-segment pages.
pub fn classify_url(url: &Url, base_url: &str, manga_dir: &str) -> UrlKind {
    let Ok(base) = Url::parse(base_url) else {
        return UrlKind::Other;
    };
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    let path_len_is = |n: usize| {
        (segments.len() == n && !segments[n - 1].is_empty())
            || (segments.len() == n + 1 && segments[n].is_empty())
    };
    let dir = manga_dir.trim_matches('/');
    if url.host_str() == base.host_str() && path_len_is(2) && segments[0] == dir {
        UrlKind::Series(segments[1].to_string())
    } else if path_len_is(1) {
        UrlKind::MaybeChapter
    } else {
        UrlKind::Other
    }
}

/// Chapter pages carry `home > series > chapter` breadcrumbs.
pub fn series_id_from_breadcrumb(body: &str) -> Option<String> {
    let doc = html::parse(body);
    let links = html::select_all(doc.root_element(), "a[itemprop=item]");
    if links.len() != 3 {
        return None;
    }
    let href = Url::parse(html::attr(links[1], "href")?).ok()?;
    href.path_segments()?.nth(1).map(str::to_string)
}

pub fn parse_genres(body: &str) -> Vec<FilterOption> {
    let doc = html::parse(body);
    let Some(list) = html::select_first(doc.root_element(), "ul.c4") else {
        return Vec::new();
    };
    html::select_all(list, "li")
        .into_iter()
        .filter_map(|li| {
            let label = html::text(html::select_first(li, "label")?);
            let value = html::select_first(li, "input[type=checkbox]")
                .and_then(|input| html::attr(input, "value"))
                .map_or_else(|| label.clone(), str::to_string);
            Some(FilterOption::new(label, value))
        })
        .collect()
}

pub fn parse_listing(body: &str, page_url: &str) -> SeriesPage {
    let doc = html::parse(body);
    let root = doc.root_element();
    let items = html::select_all(root, LIST_ITEM_SELECTOR)
        .into_iter()
        .filter_map(|el| {
            let link = html::select_first(el, "a")?;
            let href = html::abs_attr(link, "href", page_url)?;
            let mut series = Series::new(
                html::url_without_domain(&href),
                html::attr(link, "title").unwrap_or_default(),
            );
            series.thumbnail_url =
                html::select_first(el, "img").and_then(|img| html::abs_attr(img, "src", page_url));
            Some(series)
        })
        .collect();
    SeriesPage::new(items, html::select_first(root, NEXT_PAGE_SELECTOR).is_some())
}

/// First element found by any of the given lookups.
fn first_of<'a>(lookups: &[Vec<ElementRef<'a>>]) -> Option<ElementRef<'a>> {
    lookups.iter().find_map(|found| found.first().copied())
}

/// Cells of `td:last-child` in table rows mentioning `needle`.
fn info_cells<'a>(root: ElementRef<'a>, needle: &str) -> Vec<ElementRef<'a>> {
    html::select_containing(root, ".infotable tr", needle)
        .into_iter()
        .filter_map(|row| html::select_first(row, "td:last-child"))
        .collect()
}

fn contained_children<'a>(root: ElementRef<'a>, css: &str, needle: &str, child: &str) -> Vec<ElementRef<'a>> {
    html::select_containing(root, css, needle)
        .into_iter()
        .flat_map(|el| html::select_all(el, child))
        .collect()
}

pub fn parse_details(body: &str, location: &str) -> Result<Series> {
    let doc = html::parse(body);
    let root = doc.root_element();

    let title = html::text(html::require(root, "h1.entry-title")?);
    let mut series = Series::new(html::url_without_domain(location), title);

    series.author = first_of(&[
        html::select_containing(root, ".listinfo li", "Author"),
        html::select_all(root, ".tsinfo .imptdt:nth-child(4) i"),
        info_cells(root, "author"),
    ])
    .map(html::own_text)
    .filter(|t| !t.is_empty());

    series.artist = first_of(&[
        info_cells(root, "artist"),
        contained_children(root, ".tsinfo .imptdt", "artist", "i"),
    ])
    .map(html::own_text)
    .filter(|t| !t.is_empty());

    series.genres = html::each_text(&html::select_all(root, "div.gnr a, .mgen a, .seriestugenre a"));

    let status_text = [
        html::select_containing(root, "div.listinfo li", "Status"),
        html::select_containing(root, ".tsinfo .imptdt", "status"),
        html::select_containing(root, ".infotable tr", "status")
            .into_iter()
            .flat_map(|row| html::select_all(row, "td"))
            .collect(),
    ]
    .iter()
    .flatten()
    .map(|el| html::text(*el))
    .collect::<Vec<_>>()
    .join(" ");
    series.status = parse_status(&status_text);

    series.thumbnail_url = html::select_first(root, ".infomanga > div[itemprop=image] img, .thumb img")
        .and_then(|img| html::abs_attr(img, "src", location));

    let mut description = html::select_all(root, ".desc, .entry-content[itemprop=description]")
        .into_iter()
        .map(html::text)
        .collect::<Vec<_>>()
        .join("\n");

    let series_type = first_of(&[
        contained_children(root, "span", "Type", "a"),
        contained_children(root, ".imptdt", "Type", "a"),
        html::select_all(root, r"a[href*='type=']"),
        info_cells(root, "Type"),
    ])
    .map(html::own_text)
    .filter(|t| !t.is_empty());
    if let Some(kind) = series_type {
        if !series.genres.iter().any(|g| g.eq_ignore_ascii_case(&kind)) {
            series.genres.push(kind);
        }
    }

    let alt_name = html::select_first(root, ".alternative, .seriestualt")
        .map(html::own_text)
        .filter(|t| !t.is_empty());
    if let Some(alt) = alt_name {
        if !description.is_empty() {
            description.push_str("\n\n");
        }
        description.push_str(ALT_NAME_PREFIX);
        description.push_str(&alt);
    }
    series.description = Some(description);
    Ok(series)
}

pub fn parse_status(text: &str) -> SeriesStatus {
    if text.contains("Ongoing") {
        SeriesStatus::Ongoing
    } else if text.contains("Completed") {
        SeriesStatus::Completed
    } else {
        SeriesStatus::Unknown
    }
}

pub fn parse_chapters(body: &str, page_url: &str, lang: &str, date_formats: &[&str]) -> Vec<Chapter> {
    let doc = html::parse(body);
    let root = doc.root_element();
    let mut chapters: Vec<Chapter> = html::select_all(root, CHAPTER_SELECTOR)
        .into_iter()
        .filter_map(|el| {
            let link = if el.value().name() == "a" {
                el
            } else {
                html::select_first(el, "a")?
            };
            let href = html::abs_attr(link, "href", page_url)?;
            let name = html::each_text(&html::select_all(el, ".lch a, .chapternum")).join(" ");
            let number = CHAPTER_NUMBER_RE
                .captures(&name)
                .and_then(|caps| caps[1].parse::<f32>().ok())
                .unwrap_or(-1.0);
            let mut chapter = Chapter::new(html::url_without_domain(&href), name, number);
            chapter.date_upload = html::select_first(el, ".chapterdate")
                .and_then(|date| dates::parse_site_date(&html::text(date), lang, date_formats));
            Some(chapter)
        })
        .collect();

    // Sites without per-chapter dates still expose when the series was last updated.
    let modified = html::select_first(root, ".listinfo time[itemprop=dateModified]")
        .and_then(|time| html::attr(time, "datetime"))
        .and_then(|datetime| dates::parse_date(datetime.get(..10).unwrap_or(datetime), &["%Y-%m-%d"]));
    if let (Some(date), Some(first)) = (modified, chapters.first_mut()) {
        first.date_upload = Some(date);
    }
    chapters
}

pub fn parse_pages(body: &str, page_url: &str) -> Result<Vec<Page>> {
    let doc = html::parse(body);
    let pages: Vec<Page> = html::select_all(doc.root_element(), PAGE_SELECTOR)
        .into_iter()
        .filter_map(|img| html::abs_attr(img, "src", page_url))
        .enumerate()
        .map(|(index, url)| Page::image(index, url))
        .collect();
    if !pages.is_empty() {
        return Ok(pages);
    }

    // Some readers build the page list from a script instead.
    let list = IMAGES_RE
        .captures(body)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| SourceError::not_found("reader images"))?;
    let images: Vec<String> = serde_json::from_str(&list)?;
    Ok(images
        .into_iter()
        .enumerate()
        .map(|(index, url)| Page::image(index, url))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const BASE: &str = "https://reader.example";

    #[test]
    fn listing_and_genres() {
        let body = r#"
            <div class="listupd">
              <div class="bs"><div class="bsx"><a href="https://reader.example/manga/solo/" title="Solo Leveling">
                <img src="/covers/solo.jpg"></a></div></div>
              <div class="bs"><div class="bsx"><a href="/manga/omniscient/" title="Omniscient Reader">
                <img src="https://cdn.example/o.jpg"></a></div></div>
            </div>
            <div class="hpage"><a class="r" href="?page=2">Next</a></div>
            <ul class="c4">
              <li><input type="checkbox" value="7"><label>Action</label></li>
              <li><input type="checkbox"><label>Drama</label></li>
            </ul>"#;
        let page = parse_listing(body, BASE);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "Solo Leveling");
        assert_eq!(page.items[0].url, "/manga/solo/");
        assert_eq!(page.items[0].thumbnail_url.as_deref(), Some("https://reader.example/covers/solo.jpg"));
        assert!(page.has_next_page);

        let genres = parse_genres(body);
        assert_eq!(genres[0], FilterOption::new("Action", "7"));
        assert_eq!(genres[1], FilterOption::new("Drama", "Drama"));
    }

    const DETAILS: &str = r#"
        <h1 class="entry-title">Solo Leveling</h1>
        <span class="alternative">나 혼자만 레벨업</span>
        <div class="thumb"><img src="/covers/solo.jpg"></div>
        <div class="tsinfo">
          <div class="imptdt">Status <i>Completed</i></div>
          <div class="imptdt">Type <a href="https://reader.example/manga/?type=manhwa">Manhwa</a></div>
          <div class="imptdt">Released <i>2018</i></div>
          <div class="imptdt">Author <i>Chugong</i></div>
          <div class="imptdt">Artist <i>DUBU</i></div>
        </div>
        <div class="mgen"><a>Action</a><a>Fantasy</a></div>
        <div class="entry-content" itemprop="description"><p>Weakest hunter.</p></div>
        <div class="listinfo"><time itemprop="dateModified" datetime="2021-12-30T10:00:00+00:00"></time></div>
        <div id="chapterlist"><ul>
          <li><div class="eph-num"><a href="https://reader.example/solo-leveling-chapter-200/">
            <span class="chapternum">Chapter 200</span><span class="chapterdate">December 29, 2021</span></a></div></li>
          <li><div class="eph-num"><a href="https://reader.example/solo-leveling-chapter-199-5/">
            <span class="chapternum">Chapter 199.5</span><span class="chapterdate">December 20, 2021</span></a></div></li>
          <li><div class="eph-num"><a href="https://reader.example/solo-leveling-prologue/">
            <span class="chapternum">Prologue</span></a></div></li>
        </ul></div>"#;

    #[test]
    fn details_combine_theme_variants() {
        let series = parse_details(DETAILS, "https://reader.example/manga/solo/").unwrap();
        assert_eq!(series.title, "Solo Leveling");
        assert_eq!(series.author.as_deref(), Some("Chugong"));
        assert_eq!(series.artist.as_deref(), Some("DUBU"));
        assert_eq!(series.status, SeriesStatus::Completed);
        assert_eq!(series.genres, vec!["Action", "Fantasy", "Manhwa"]);
        assert_eq!(
            series.description.as_deref(),
            Some("Weakest hunter.\n\nAlternative Name: 나 혼자만 레벨업")
        );
    }

    #[test]
    fn chapters_take_numbers_and_dates() {
        let chapters = parse_chapters(DETAILS, BASE, "en", &["%B %d, %Y"]);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].url, "/solo-leveling-chapter-200/");
        assert_eq!(chapters[0].number, 200.0);
        // The newest chapter takes the series modification date.
        assert_eq!(chapters[0].date_upload.unwrap().day(), 30);
        assert_eq!(chapters[1].number, 199.5);
        assert_eq!(chapters[1].date_upload.unwrap().day(), 20);
        assert_eq!(chapters[2].number, -1.0);
        assert!(chapters[2].date_upload.is_none());
    }

    #[test]
    fn recent_chapters_use_relative_dates() {
        let body = r#"<div id="chapterlist"><ul>
            <li><div class="eph-num"><a href="https://reader.example/x-chapter-12/">
              <span class="chapternum">Chapter 12</span><span class="chapterdate">3 days ago</span></a></div></li>
          </ul></div>"#;
        let chapters = parse_chapters(body, BASE, "en", &["%B %d, %Y"]);
        let date = chapters[0].date_upload.unwrap();
        let age = chrono::Utc::now() - date;
        assert!(age >= chrono::Duration::days(3) && age < chrono::Duration::days(4));
    }

    #[test]
    fn pages_from_images_or_script() {
        let body = r#"<div id="readerarea"><img src="https://cdn.example/1.jpg"><img src="">
            <img src="/2.jpg"></div>"#;
        let pages = parse_pages(body, BASE).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].image_url.as_deref(), Some("https://reader.example/2.jpg"));
        assert_eq!(pages[1].index, 1);

        let script = r#"<div id="readerarea"></div><script>ts_reader.run({"sources":[{"source":"Server 1",
            "images":["https:\/\/cdn.example\/a.jpg","https:\/\/cdn.example\/b.jpg"]}]});</script>"#;
        let pages = parse_pages(script, BASE).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].image_url.as_deref(), Some("https://cdn.example/a.jpg"));

        assert!(parse_pages("<p></p>", BASE).is_err());
    }

    #[test]
    fn classifies_pasted_urls() {
        let series = Url::parse("https://reader.example/manga/solo-leveling/").unwrap();
        assert_eq!(
            classify_url(&series, BASE, "/manga"),
            UrlKind::Series("solo-leveling".to_string())
        );
        let chapter = Url::parse("https://reader.example/solo-leveling-chapter-1/").unwrap();
        assert_eq!(classify_url(&chapter, BASE, "/manga"), UrlKind::MaybeChapter);
        let other = Url::parse("https://elsewhere.example/manga/x/y/z").unwrap();
        assert_eq!(classify_url(&other, BASE, "/manga"), UrlKind::Other);
    }

    #[test]
    fn breadcrumb_points_at_series() {
        let body = r#"<ol>
            <li><a itemprop="item" href="https://reader.example/">Home</a></li>
            <li><a itemprop="item" href="https://reader.example/manga/solo-leveling/">Solo</a></li>
            <li><a itemprop="item" href="https://reader.example/solo-leveling-chapter-1/">Ch 1</a></li></ol>"#;
        assert_eq!(series_id_from_breadcrumb(body).as_deref(), Some("solo-leveling"));
    }
}
