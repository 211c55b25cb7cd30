//! AnimeStream, a WordPress anime theme with an `/anime` catalog page and
//! base64-encoded mirror lists.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use reqwest::RequestBuilder;
use scraper::ElementRef;
use tracing::{debug, warn};
use url::Url;

use super::{Embed, EmbedResolver, PATH_PREFIX, absolute};
use crate::dates;
use crate::error::{Result, SourceError};
use crate::filters::{CheckBoxGroup, Filter, FilterList, FilterOption, Select};
use crate::html;
use crate::parallel::catching_flat_map;
use crate::providers::{AnimeSource, SourceContext, SourceInfo};
use crate::quality::sort_videos;
use crate::types::{Episode, Series, SeriesPage, SeriesStatus, Video};

const LIST_ITEM_SELECTOR: &str = "div.listupd article a.tip";
const NEXT_PAGE_SELECTOR: &str = "div.pagination a.next, div.hpage > a.r";
const FILTERS_SELECTOR: &str = "span.sec1 > div.filter > ul";
const MIRROR_SELECTOR: &str = "select.mirror > option[data-index], ul.mirror a[data-em]";

#[derive(Debug, Clone)]
pub struct AnimeStreamConfig {
    pub name: &'static str,
    pub lang: &'static str,
    pub base_url: &'static str,
    pub anime_list_path: &'static str,
    pub fetch_filters: bool,
    pub date_formats: &'static [&'static str],
    pub default_quality: &'static str,
}

impl AnimeStreamConfig {
    pub fn new(name: &'static str, lang: &'static str, base_url: &'static str) -> Self {
        Self {
            name,
            lang,
            base_url,
            anime_list_path: "/anime",
            fetch_filters: true,
            date_formats: &["%B %d, %Y"],
            default_quality: "720p",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Labels {
    pub lang: &'static str,
    pub filters_missing: &'static str,
    /// Display names of the catalog filter groups, in page order.
    pub groups: [&'static str; 7],
    pub status: &'static str,
    pub author: &'static str,
    pub artist: &'static str,
    pub alt_name_prefix: &'static str,
    pub episode_prefix: &'static str,
}

pub fn labels(lang: &str) -> Labels {
    if lang == "pt-BR" {
        Labels {
            lang: "pt-BR",
            filters_missing: "Os filtros aparecem depois da primeira listagem",
            groups: ["Gêneros", "Temporadas", "Estúdios", "Status", "Tipo", "Legenda", "Ordem"],
            status: "Status",
            author: "Fansub",
            artist: "Estudio",
            alt_name_prefix: "Nome(s) alternativo(s): ",
            episode_prefix: "Episódio",
        }
    } else {
        Labels {
            lang: "en",
            filters_missing: "Filters show up after the first listing",
            groups: ["Genres", "Seasons", "Studios", "Status", "Type", "Subtitle", "Order"],
            status: "Status",
            author: "Fansub",
            artist: "Studio",
            alt_name_prefix: "Alternative name(s): ",
            episode_prefix: "Episode",
        }
    }
}

/// Query keys of the catalog filter groups, in page order, used when the
/// inputs carry no `name`. Multi-valued groups end in `[]`.
const GROUP_KEYS: [&str; 7] = ["genre[]", "season[]", "studio[]", "status", "type", "sub", "order"];

pub struct AnimeStream {
    info: SourceInfo,
    config: AnimeStreamConfig,
    labels: Labels,
    ctx: SourceContext,
    resolver: Arc<dyn EmbedResolver>,
    filters: RwLock<Option<Vec<Filter>>>,
}

impl AnimeStream {
    pub fn new(
        config: AnimeStreamConfig,
        ctx: SourceContext,
        resolver: Arc<dyn EmbedResolver>,
    ) -> Self {
        let base_url = ctx.base_url(config.name, config.base_url);
        let info = SourceInfo::new(config.name, config.lang, &base_url, true);
        Self {
            labels: labels(config.lang),
            info,
            config,
            ctx,
            resolver,
            filters: RwLock::new(None),
        }
    }

    fn base(&self) -> &str {
        &self.info.base_url
    }

    fn anime_list_url(&self) -> String {
        format!("{}{}", self.base(), self.config.anime_list_path)
    }

    fn request(&self, url: &str) -> RequestBuilder {
        self.ctx.http.get(url).header("Referer", format!("{}/", self.base()))
    }

    async fn listing(&self, url: &str) -> Result<SeriesPage> {
        let page = self.ctx.http.fetch(self.request(url)).await?;
        Ok(parse_listing(&page.body, &page.url))
    }

    async fn ensure_filters(&self) {
        if !self.config.fetch_filters || self.cached_filters().is_some() {
            return;
        }
        let url = self.anime_list_url();
        let page = match self.ctx.http.fetch(self.request(&url)).await {
            Ok(page) => page,
            Err(err) => {
                warn!(source = self.config.name, error = %err, "could not fetch filters");
                return;
            }
        };
        let filters = parse_filter_groups(&page.body, &self.labels);
        if filters.is_empty() {
            return;
        }
        if let Ok(mut cache) = self.filters.write() {
            *cache = Some(filters);
        }
    }

    fn cached_filters(&self) -> Option<Vec<Filter>> {
        self.filters.read().ok().and_then(|cache| cache.clone())
    }

    async fn mirror_videos(&self, mirror: Mirror, referer: &str) -> Result<Vec<Video>> {
        let url = match decode_mirror(&mirror.value)? {
            MirrorTarget::Page(url) => {
                let page = self.ctx.http.fetch(self.request(&url)).await?;
                embed_from_html(&page.body, &page.url)
            }
            MirrorTarget::Html(snippet) => embed_from_html(&snippet, referer),
        }
        .ok_or_else(|| SourceError::not_found(format!("embed for mirror `{}`", mirror.label)))?;
        debug!(mirror = %mirror.label, %url, "mirror embed");
        let embed = Embed {
            url,
            label: mirror.label,
            referer: format!("{}/", self.base()),
        };
        self.resolver.resolve(&self.ctx.http, &embed).await
    }
}

#[async_trait]
impl AnimeSource for AnimeStream {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, page: u32) -> Result<SeriesPage> {
        self.ensure_filters().await;
        self.listing(&format!("{}/?page={page}&order=popular", self.anime_list_url()))
            .await
    }

    async fn latest(&self, page: u32) -> Result<SeriesPage> {
        self.ensure_filters().await;
        self.listing(&format!("{}/?page={page}&order=update", self.anime_list_url()))
            .await
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        if let Some(path) = query.strip_prefix(PATH_PREFIX) {
            let url = absolute(self.base(), path.trim());
            let fetched = self.ctx.http.fetch(self.request(&url)).await?;
            let mut series = parse_details(&fetched.body, &fetched.url, &self.labels)?;
            series.url = html::url_without_domain(&fetched.url);
            return Ok(SeriesPage::single(series));
        }

        let url = if query.trim().is_empty() {
            let mut url = Url::parse(&format!("{}/", self.anime_list_url()))?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("page", &page.to_string());
                for (key, value) in filters.query_pairs() {
                    pairs.append_pair(&key, &value);
                }
            }
            url
        } else {
            let mut url = Url::parse(&format!("{}/page/{page}/", self.base()))?;
            url.query_pairs_mut().append_pair("s", query.trim());
            url
        };
        self.listing(url.as_str()).await
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let page = self
            .ctx
            .http
            .fetch(self.request(&absolute(self.base(), &series.url)))
            .await?;
        parse_details(&page.body, &page.url, &self.labels)
    }

    async fn episodes(&self, series: &Series) -> Result<Vec<Episode>> {
        let page = self
            .ctx
            .http
            .fetch(self.request(&absolute(self.base(), &series.url)))
            .await?;
        Ok(parse_episodes(
            &page.body,
            &page.url,
            &self.labels,
            self.config.date_formats,
        ))
    }

    async fn videos(&self, episode: &Episode) -> Result<Vec<Video>> {
        let page = self
            .ctx
            .http
            .fetch(self.request(&absolute(self.base(), &episode.url)))
            .await?;
        let mirrors = mirrors(&page.body);
        debug!(count = mirrors.len(), url = %page.url, "mirrors");
        let referer = page.url.as_str();
        let mut videos = catching_flat_map(mirrors, self.ctx.concurrency(), |mirror| {
            self.mirror_videos(mirror, referer)
        })
        .await;
        let prefs = self.ctx.prefs(self.config.name);
        let preferred = prefs
            .preferred_quality
            .as_deref()
            .unwrap_or(self.config.default_quality);
        sort_videos(&mut videos, Some(preferred));
        Ok(videos)
    }

    fn filters(&self) -> FilterList {
        match self.cached_filters() {
            Some(filters) => FilterList::new(filters),
            None if self.config.fetch_filters => {
                FilterList::new(vec![Filter::header(self.labels.filters_missing)])
            }
            None => FilterList::empty(),
        }
    }

    async fn refresh_filters(&self) -> Result<()> {
        self.ensure_filters().await;
        Ok(())
    }
}

pub fn parse_listing(body: &str, page_url: &str) -> SeriesPage {
    let doc = html::parse(body);
    let root = doc.root_element();
    let items = html::select_all(root, LIST_ITEM_SELECTOR)
        .into_iter()
        .filter_map(|el| {
            let href = html::abs_attr(el, "href", page_url)?;
            let title = html::own_text(html::select_first(el, "div.tt, div.ttl")?);
            let mut series = Series::new(html::url_without_domain(&href), title);
            series.thumbnail_url = html::select_first(el, "img").and_then(|img| thumbnail(img, page_url));
            Some(series)
        })
        .collect();
    SeriesPage::new(items, html::select_first(root, NEXT_PAGE_SELECTOR).is_some())
}

fn thumbnail(img: ElementRef<'_>, base: &str) -> Option<String> {
    html::image_url(img, base).map(|url| match url.split_once("?resize") {
        Some((before, _)) => before.to_string(),
        None => url,
    })
}

/// The catalog's filter groups: checkbox lists become checkbox groups and
/// radio lists become selects, a separator between the two kinds.
pub fn parse_filter_groups(body: &str, labels: &Labels) -> Vec<Filter> {
    let doc = html::parse(body);
    let mut filters: Vec<Filter> = Vec::new();
    let mut separated = false;
    for (index, ul) in html::select_all(doc.root_element(), FILTERS_SELECTOR)
        .into_iter()
        .take(GROUP_KEYS.len())
        .enumerate()
    {
        let options: Vec<FilterOption> = html::select_all(ul, "li")
            .into_iter()
            .filter_map(|li| {
                let label = html::text(html::select_first(li, "label")?);
                let input = html::select_first(li, "input")?;
                let value = input.value().attr("value").unwrap_or_default().trim();
                Some(FilterOption::new(label, value))
            })
            .collect();
        if options.is_empty() {
            continue;
        }
        let input = html::select_first(ul, "input");
        let key = input
            .and_then(|i| html::attr(i, "name"))
            .unwrap_or(GROUP_KEYS[index]);
        let checkbox = input
            .and_then(|i| html::attr(i, "type"))
            .map_or(key.ends_with("[]"), |kind| kind.eq_ignore_ascii_case("checkbox"));
        let slot = GROUP_KEYS.iter().position(|k| *k == key).unwrap_or(index);
        let name = labels.groups[slot];
        if checkbox {
            filters.push(Filter::CheckBoxGroup(CheckBoxGroup::new(key, name, options)));
        } else {
            if !separated && !filters.is_empty() {
                filters.push(Filter::Separator);
            }
            separated = true;
            filters.push(Filter::Select(Select::new(key, name, options)));
        }
    }
    filters
}

pub fn parse_details(body: &str, location: &str, labels: &Labels) -> Result<Series> {
    let doc = html::parse(body);
    let root = doc.root_element();
    let title = html::text(html::require(root, "h1.entry-title")?);
    let mut series = Series::new(html::url_without_domain(location), title);
    series.thumbnail_url = html::select_first(root, "div.thumb > img, div.limage > img")
        .and_then(|img| thumbnail(img, location));

    let infos = html::require(root, "div.info-content, div.right ul.data")?;
    let mut genres = html::each_text(&html::select_all(infos, "div.genxed > a"));
    for li in html::select_containing(infos, "li", "Genre:") {
        genres.extend(html::each_text(&html::select_all(li, "a")));
    }
    series.genres = genres;
    series.status = parse_status(info_value(infos, labels.status).as_deref());
    series.artist = info_value(infos, labels.artist);
    series.author = info_value(infos, labels.author);

    let mut description = String::new();
    if let Some(desc) = html::select_first(root, ".entry-content[itemprop=description], .desc") {
        description.push_str(&html::text(desc));
        description.push_str("\n\n");
    }
    if let Some(alt) = html::select_first(root, ".alter")
        .map(html::text)
        .filter(|alt| !alt.is_empty())
    {
        description.push_str(&format!("{}{alt}\n", labels.alt_name_prefix));
    }
    let extra = html::select_all(infos, "div.spe > span")
        .into_iter()
        .chain(
            html::select_all(infos, "li")
                .into_iter()
                .filter(|li| html::select_first(*li, "b").is_some()),
        );
    for line in extra.map(html::text).filter(|t| !t.is_empty()) {
        description.push_str(&line);
        description.push('\n');
    }
    series.description = Some(description);
    Ok(series)
}

/// Value of a `<span>Label: value</span>` info line: its link text when
/// linked, else its own text.
fn info_value(infos: ElementRef<'_>, label: &str) -> Option<String> {
    let span = html::select_containing(infos, "span", label).into_iter().next()?;
    let value = match html::select_first(span, "a") {
        Some(link) => html::text(link),
        None => html::own_text(span),
    };
    (!value.is_empty()).then_some(value)
}

pub fn parse_status(value: Option<&str>) -> SeriesStatus {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("completed" | "completo") => SeriesStatus::Completed,
        Some("ongoing" | "lançamento") => SeriesStatus::Ongoing,
        _ => SeriesStatus::Unknown,
    }
}

pub fn parse_episodes(body: &str, page_url: &str, labels: &Labels, date_formats: &[&str]) -> Vec<Episode> {
    let doc = html::parse(body);
    html::select_all(doc.root_element(), "div.eplister > ul > li > a")
        .into_iter()
        .filter_map(|el| {
            let href = html::abs_attr(el, "href", page_url)?;
            let number_text = html::text(html::select_first(el, ".epl-num")?);
            let number = number_text
                .split(' ')
                .next()
                .and_then(|n| n.parse::<f32>().ok())
                .unwrap_or(0.0);
            let mut episode = Episode::new(
                html::url_without_domain(&href),
                format!("{} {number_text}", labels.episode_prefix),
                number,
            );
            episode.scanlator = html::select_first(el, ".epl-sub")
                .map(html::text)
                .filter(|t| !t.is_empty());
            episode.date_upload = html::select_first(el, ".epl-date")
                .and_then(|d| dates::parse_site_date(&html::text(d), labels.lang, date_formats));
            Some(episode)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub label: String,
    /// A hoster page URL or base64-encoded embed HTML.
    pub value: String,
}

pub fn mirrors(body: &str) -> Vec<Mirror> {
    let doc = html::parse(body);
    html::select_all(doc.root_element(), MIRROR_SELECTOR)
        .into_iter()
        .filter_map(|el| {
            let value = match el.value().name() {
                "option" => html::attr(el, "value"),
                "a" => html::attr(el, "data-em"),
                _ => None,
            }?;
            Some(Mirror {
                label: html::text(el),
                value: value.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorTarget {
    Page(String),
    Html(String),
}

pub fn decode_mirror(value: &str) -> Result<MirrorTarget> {
    let value = value.trim();
    if Url::parse(value).is_ok() {
        return Ok(MirrorTarget::Page(value.to_string()));
    }
    let bytes = STANDARD
        .decode(value)
        .or_else(|_| STANDARD_NO_PAD.decode(value.trim_end_matches('=')))
        .map_err(|err| SourceError::parse(format!("mirror is neither a URL nor base64: {err}")))?;
    Ok(MirrorTarget::Html(String::from_utf8_lossy(&bytes).into_owned()))
}

/// The hoster URL inside an embed snippet: an `<iframe>` source or an
/// `embedUrl` meta tag.
pub fn embed_from_html(body: &str, page_url: &str) -> Option<String> {
    let doc = html::parse(body);
    let root = doc.root_element();
    if let Some(src) = html::select_first(root, "iframe[src]").and_then(|f| html::attr(f, "src")) {
        return safe_url(src, page_url);
    }
    let meta = html::select_first(root, "meta[itemprop=embedUrl][content]")?;
    safe_url(html::attr(meta, "content")?, page_url)
}

fn safe_url(value: &str, page_url: &str) -> Option<String> {
    if value.starts_with("http") {
        Some(value.to_string())
    } else {
        html::abs_url(page_url, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const BASE: &str = "https://stream.example";

    #[test]
    fn listing_reads_own_title_text() {
        let body = r#"<div class="listupd">
            <article><a class="tip" href="https://stream.example/anime/btth/">
              <img src="https://stream.example/w/btth.jpg?resize=247,350">
              <div class="tt">Battle Through the Heavens <h2>BTTH</h2></div></a></article>
            <article><a class="tip" href="/anime/soul-land/">
              <img data-src="/w/sl.jpg"><div class="ttl">Soul Land</div></a></article>
          </div>
          <div class="hpage"><a class="r" href="?page=2">Next</a></div>"#;
        let page = parse_listing(body, BASE);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "Battle Through the Heavens");
        assert_eq!(page.items[0].url, "/anime/btth/");
        assert_eq!(page.items[0].thumbnail_url.as_deref(), Some("https://stream.example/w/btth.jpg"));
        assert_eq!(page.items[1].thumbnail_url.as_deref(), Some("https://stream.example/w/sl.jpg"));
        assert!(page.has_next_page);
    }

    const DETAILS: &str = r#"
        <h1 class="entry-title">Soul Land 2</h1>
        <span class="alter">Douluo Dalu II</span>
        <div class="thumb"><img src="/w/sl2.jpg?resize=1"></div>
        <div class="info-content">
          <div class="spe">
            <span><b>Status:</b> Ongoing</span>
            <span><b>Studio:</b> <a href="/studio/sparkly">Sparkly Key</a></span>
            <span><b>Fansub:</b> LuciferDonghua</span>
          </div>
          <div class="genxed"><a>Action</a><a>Fantasy</a></div>
        </div>
        <div class="entry-content" itemprop="description"><p>Tang San returns.</p></div>
        <div class="eplister"><ul>
          <li><a href="/soul-land-2-episode-2/"><div class="epl-num">2</div>
              <div class="epl-sub"><span>Sub</span></div><div class="epl-date">March 9, 2024</div></a></li>
          <li><a href="/soul-land-2-episode-1/"><div class="epl-num">1 END</div>
              <div class="epl-date">not a date</div></a></li>
        </ul></div>"#;

    #[test]
    fn details_collect_infos() {
        let labels = labels("en");
        let series = parse_details(DETAILS, "https://stream.example/anime/sl2/", &labels).unwrap();
        assert_eq!(series.title, "Soul Land 2");
        assert_eq!(series.url, "/anime/sl2/");
        assert_eq!(series.thumbnail_url.as_deref(), Some("https://stream.example/w/sl2.jpg"));
        assert_eq!(series.genres, vec!["Action", "Fantasy"]);
        assert_eq!(series.status, SeriesStatus::Ongoing);
        assert_eq!(series.artist.as_deref(), Some("Sparkly Key"));
        assert_eq!(series.author.as_deref(), Some("LuciferDonghua"));
        let description = series.description.unwrap();
        assert!(description.starts_with("Tang San returns.\n\nAlternative name(s): Douluo Dalu II\n"));
        assert!(description.contains("Status: Ongoing\n"));
    }

    #[test]
    fn episodes_use_prefix_and_number() {
        let episodes = parse_episodes(DETAILS, BASE, &labels("en"), &["%B %d, %Y"]);
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].name, "Episode 2");
        assert_eq!(episodes[0].scanlator.as_deref(), Some("Sub"));
        assert_eq!(episodes[0].date_upload.unwrap().month(), 3);
        assert_eq!(episodes[1].name, "Episode 1 END");
        assert_eq!(episodes[1].number, 1.0);
        assert!(episodes[1].date_upload.is_none());
    }

    #[test]
    fn status_text_maps_both_languages() {
        assert_eq!(parse_status(Some(" Completo ")), SeriesStatus::Completed);
        assert_eq!(parse_status(Some("Lançamento")), SeriesStatus::Ongoing);
        assert_eq!(parse_status(Some("Hiatus")), SeriesStatus::Unknown);
        assert_eq!(parse_status(None), SeriesStatus::Unknown);
    }

    #[test]
    fn filter_groups_follow_input_kinds() {
        let body = r#"<span class="sec1"><div class="filter"><ul>
              <li><input type="checkbox" name="genre[]" value="action"><label>Action</label></li>
              <li><input type="checkbox" name="genre[]" value="drama"><label>Drama</label></li>
            </ul></div>
            <div class="filter"><ul>
              <li><input type="radio" name="status" value=""><label>All</label></li>
              <li><input type="radio" name="status" value="ongoing"><label>Ongoing</label></li>
            </ul></div></span>"#;
        let filters = parse_filter_groups(body, &labels("en"));
        assert_eq!(filters.len(), 3);
        assert!(matches!(&filters[0], Filter::CheckBoxGroup(g) if g.key == "genre[]" && g.name == "Genres"));
        assert!(matches!(filters[1], Filter::Separator));
        assert!(matches!(&filters[2], Filter::Select(s) if s.key == "status" && s.name == "Status"));

        let mut list = FilterList::new(filters);
        list.apply_state("genre[]", "drama").unwrap();
        list.apply_state("status", "ongoing").unwrap();
        let pairs = list.query_pairs();
        assert_eq!(pairs[0], ("genre[]".to_string(), "drama".to_string()));
        assert_eq!(pairs[1], ("status".to_string(), "ongoing".to_string()));
    }

    #[test]
    fn mirrors_decode_to_embeds() {
        let encoded = STANDARD.encode(r#"<iframe src="//hoster.example/e/abc" allowfullscreen></iframe>"#);
        let body = format!(
            r#"<select class="mirror">
                 <option value="" data-index="0">Select Video Server</option>
                 <option value="{encoded}" data-index="1">Dailymotion</option>
                 <option value="https://stream.example/player/2" data-index="2">Direct</option>
               </select>"#
        );
        let found = mirrors(&body);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].label, "Dailymotion");

        let MirrorTarget::Html(snippet) = decode_mirror(&found[0].value).unwrap() else {
            panic!("expected html");
        };
        assert_eq!(
            embed_from_html(&snippet, BASE).as_deref(),
            Some("https://hoster.example/e/abc")
        );
        assert_eq!(
            decode_mirror(&found[1].value).unwrap(),
            MirrorTarget::Page("https://stream.example/player/2".to_string())
        );
    }

    #[test]
    fn embed_falls_back_to_meta() {
        let body = r#"<meta itemprop="embedUrl" content="https://hoster.example/embed/9">"#;
        assert_eq!(embed_from_html(body, BASE).as_deref(), Some("https://hoster.example/embed/9"));
        assert_eq!(embed_from_html("<p></p>", BASE), None);
    }
}
