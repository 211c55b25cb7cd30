use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::RequestBuilder;
use scraper::ElementRef;
use url::Url;

use super::{MangaSource, SourceContext, SourceInfo};
use crate::error::Result;
use crate::filters::{CheckBoxGroup, Filter, FilterList, Select, options};
use crate::html;
use crate::themes::absolute;
use crate::types::{Chapter, Page, Series, SeriesPage, SeriesStatus};

const MANGAPILL_BASE_URL: &str = "https://mangapill.com";

static CHAPTER_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("valid regex"));

pub struct Mangapill {
    info: SourceInfo,
    ctx: SourceContext,
}

impl Mangapill {
    pub fn new(ctx: SourceContext) -> Self {
        let base_url = ctx.base_url("Mangapill", MANGAPILL_BASE_URL);
        Self {
            info: SourceInfo::new("Mangapill", "en", &base_url, false),
            ctx,
        }
    }

    fn base(&self) -> &str {
        &self.info.base_url
    }

    fn request(&self, url: &str) -> RequestBuilder {
        self.ctx.http.get(url).header("Referer", format!("{}/", self.base()))
    }
}

#[async_trait]
impl MangaSource for Mangapill {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, page: u32) -> Result<SeriesPage> {
        self.search(page, "", &FilterList::empty()).await
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        let mut url = Url::parse(&format!("{}/search", self.base()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query.trim());
            for (key, value) in filters.query_pairs() {
                pairs.append_pair(&key, &value);
            }
            pairs.append_pair("page", &page.to_string());
        }
        let page = self.ctx.http.fetch(self.request(url.as_str())).await?;
        Ok(parse_search(&page.body, &page.url))
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
        Ok(parse_chapters(&page.body))
    }

    async fn pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        let page = self
            .ctx
            .http
            .fetch(self.request(&absolute(self.base(), &chapter.url)))
            .await?;
        Ok(parse_pages(&page.body, &format!("{}/", self.base())))
    }

    fn filters(&self) -> FilterList {
        FilterList::new(vec![
            Filter::Select(Select::new(
                "type",
                "Type",
                options(&[
                    ("All", ""),
                    ("Manga", "manga"),
                    ("Novel", "novel"),
                    ("One-Shot", "one-shot"),
                    ("Doujinshi", "doujinshi"),
                    ("Manhwa", "manhwa"),
                    ("Manhua", "manhua"),
                    ("Oel", "oel"),
                ]),
            )),
            Filter::Select(Select::new(
                "status",
                "Status",
                options(&[
                    ("All", ""),
                    ("Publishing", "publishing"),
                    ("Finished", "finished"),
                    ("On Hiatus", "on hiatus"),
                    ("Discontinued", "discontinued"),
                    ("Not yet published", "not yet published"),
                ]),
            )),
            Filter::CheckBoxGroup(CheckBoxGroup::new(
                "genre",
                "Genres",
                options(&[
                    ("Action", "Action"),
                    ("Adventure", "Adventure"),
                    ("Comedy", "Comedy"),
                    ("Drama", "Drama"),
                    ("Fantasy", "Fantasy"),
                    ("Horror", "Horror"),
                    ("Isekai", "Isekai"),
                    ("Mystery", "Mystery"),
                    ("Romance", "Romance"),
                    ("Sci-Fi", "Sci-Fi"),
                    ("Slice of Life", "Slice of Life"),
                    ("Sports", "Sports"),
                ]),
            )),
        ])
    }
}

/// Cards link the cover and the title separately; both anchors share an href.
pub fn parse_search(body: &str, page_url: &str) -> SeriesPage {
    let doc = html::parse(body);
    let root = doc.root_element();
    let mut items: Vec<Series> = Vec::new();
    for link in html::select_all(root, r#"a[href^="/manga/"]"#) {
        let Some(href) = html::attr(link, "href") else {
            continue;
        };
        if href.trim_start_matches("/manga/").is_empty() {
            continue;
        }
        let index = match items.iter().position(|s| s.url == href) {
            Some(index) => index,
            None => {
                items.push(Series::new(href, ""));
                items.len() - 1
            }
        };
        let series = &mut items[index];
        if let Some(title) = html::select_first(link, "div.font-black, div.mt-3").map(html::text) {
            if series.title.is_empty() && !title.is_empty() {
                series.title = title;
            }
        }
        if series.thumbnail_url.is_none() {
            series.thumbnail_url =
                html::select_first(link, "img").and_then(|img| html::image_url(img, page_url));
        }
    }
    items.retain(|s| !s.title.is_empty());
    let has_next = !html::select_containing(root, "a.btn", "next").is_empty();
    SeriesPage::new(items, has_next)
}

/// Value next to a `<label>` in the details sidebar.
fn labelled<'a>(root: ElementRef<'a>, label: &str) -> Option<String> {
    html::select_all(root, "label")
        .into_iter()
        .find(|el| html::text(*el).eq_ignore_ascii_case(label))
        .and_then(|el| el.parent().and_then(ElementRef::wrap))
        .and_then(|parent| html::select_first(parent, "div"))
        .map(html::text)
}

pub fn parse_status(value: Option<&str>) -> SeriesStatus {
    match value.map(str::to_lowercase).as_deref() {
        Some("publishing") => SeriesStatus::Ongoing,
        Some("finished") => SeriesStatus::Completed,
        Some("on hiatus") => SeriesStatus::OnHiatus,
        Some("discontinued") => SeriesStatus::Cancelled,
        _ => SeriesStatus::Unknown,
    }
}

pub fn parse_details(body: &str, location: &str) -> Result<Series> {
    let doc = html::parse(body);
    let root = doc.root_element();
    let title = html::text(html::require(root, "h1")?);
    let mut series = Series::new(html::url_without_domain(location), title);
    series.thumbnail_url = html::select_first(root, "div.container img")
        .and_then(|img| html::image_url(img, location));
    series.description = html::select_first(root, "p.text-sm.text--secondary").map(html::text);
    series.genres = html::each_text(&html::select_all(root, r#"a[href*="genre="]"#));
    series.status = parse_status(labelled(root, "Status").as_deref());
    Ok(series)
}

pub fn parse_chapters(body: &str) -> Vec<Chapter> {
    let doc = html::parse(body);
    let mut chapters: Vec<Chapter> = Vec::new();
    for el in html::select_all(doc.root_element(), r#"a[href^="/chapters/"]"#) {
        let Some(href) = html::attr(el, "href") else {
            continue;
        };
        let name = html::text(el);
        if name.is_empty() || chapters.iter().any(|c| c.url == href) {
            continue;
        }
        let number = CHAPTER_NUMBER_RE
            .captures(&name)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(-1.0);
        chapters.push(Chapter::new(href, name, number));
    }
    chapters
}

/// Images are served from a CDN that checks the site referer.
pub fn parse_pages(body: &str, referer: &str) -> Vec<Page> {
    let doc = html::parse(body);
    html::select_all(doc.root_element(), "img.js-page[data-src]")
        .into_iter()
        .filter_map(|img| html::attr(img, "data-src"))
        .enumerate()
        .map(|(index, src)| {
            let mut page = Page::image(index, src);
            page.headers.insert("Referer".to_string(), referer.to_string());
            page
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://mangapill.com/search?q=jujutsu";

    #[test]
    fn search_merges_cover_and_title_links() {
        let body = r#"
            <div class="grid">
              <div>
                <a href="/manga/2085/jujutsu-kaisen"><figure><img data-src="https://cdn.example/jjk.jpg"></figure></a>
                <div><a href="/manga/2085/jujutsu-kaisen"><div class="mt-3 font-black">Jujutsu Kaisen</div></a></div>
              </div>
              <div>
                <a href="/manga/9000/jujutsu-kaisen-0"><div class="mt-3">Jujutsu Kaisen 0</div></a>
              </div>
            </div>
            <a class="btn btn-sm" href="/search?q=jujutsu&page=2">Next</a>"#;
        let page = parse_search(body, BASE);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].url, "/manga/2085/jujutsu-kaisen");
        assert_eq!(page.items[0].title, "Jujutsu Kaisen");
        assert_eq!(page.items[0].thumbnail_url.as_deref(), Some("https://cdn.example/jjk.jpg"));
        assert!(page.items[1].thumbnail_url.is_none());
        assert!(page.has_next_page);
    }

    #[test]
    fn details_and_chapters() {
        let body = r#"
            <div class="container">
              <img data-src="https://cdn.example/jjk.jpg">
              <h1>Jujutsu Kaisen</h1>
              <p class="text-sm text--secondary">Curses.</p>
              <div><label class="text-secondary">Status</label><div>publishing</div></div>
              <a href="/search?genre=Action">Action</a>
              <a href="/search?genre=Supernatural">Supernatural</a>
            </div>
            <div id="chapters">
              <a href="/chapters/2085-10271000/jujutsu-kaisen-chapter-271">Chapter 271</a>
              <a href="/chapters/2085-10270500/jujutsu-kaisen-chapter-270.5">Chapter 270.5</a>
              <a href="/chapters/2085-10271000/jujutsu-kaisen-chapter-271">Chapter 271</a>
            </div>"#;
        let series = parse_details(body, "https://mangapill.com/manga/2085/jujutsu-kaisen").unwrap();
        assert_eq!(series.url, "/manga/2085/jujutsu-kaisen");
        assert_eq!(series.status, SeriesStatus::Ongoing);
        assert_eq!(series.genres, vec!["Action", "Supernatural"]);
        assert_eq!(series.description.as_deref(), Some("Curses."));

        let chapters = parse_chapters(body);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].number, 271.0);
        assert_eq!(chapters[1].number, 270.5);
    }

    #[test]
    fn pages_carry_referer() {
        let body = r#"<chapter-page><img class="js-page" data-src="https://cdn.example/1.jpeg"></chapter-page>
            <img class="js-page" src="/loading.gif">"#;
        let pages = parse_pages(body, "https://mangapill.com/");
        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages[0].headers.get("Referer").map(String::as_str),
            Some("https://mangapill.com/")
        );
    }
}
