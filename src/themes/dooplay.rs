//! DooPlay, a WordPress theme used by many anime streaming sites.

use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::RequestBuilder;
use scraper::ElementRef;
use tracing::{debug, warn};
use url::Url;

use super::{Embed, EmbedResolver, PATH_PREFIX, absolute};
use crate::dates;
use crate::error::{Result, SourceError};
use crate::filters::{Filter, FilterList, FilterOption, Select};
use crate::html;
use crate::http::Fetched;
use crate::parallel::catching_flat_map;
use crate::providers::{AnimeSource, SourceContext, SourceInfo};
use crate::quality::sort_videos;
use crate::types::{Episode, Series, SeriesPage, Video};

static EPISODE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)$").expect("valid regex"));

const DATE_FORMATS: &[&str] = &["%B. %d, %Y", "%b. %d, %Y", "%B %d, %Y"];
const ANIME_MENU_SELECTOR: &str = "div.pag_episodes div.item a[href] i.fa-bars";
const PLAYER_OPTIONS_SELECTOR: &str = "ul#playeroptionsul li";
const ADDITIONAL_INFO_SELECTOR: &str = "div#info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeLayout {
    /// `div#seasons` blocks; names carry the season and a page without
    /// seasons is a single movie episode.
    Seasons,
    /// One plain `ul.episodios` list; `/movie...` paths are one episode.
    Flat,
}

#[derive(Debug, Clone)]
pub struct DooPlayConfig {
    pub name: &'static str,
    pub lang: &'static str,
    pub base_url: &'static str,
    pub popular_selector: &'static str,
    pub latest_path: &'static str,
    pub latest_selector: &'static str,
    pub latest_next_page_selector: &'static str,
    pub search_selector: &'static str,
    /// Items on a filter (genre, year, ...) listing.
    pub filter_results_selector: &'static str,
    pub episode_layout: EpisodeLayout,
    /// Scrape the genre menu into a filter on the first listing.
    pub fetch_genres: bool,
    /// Fixed filters, used instead of scraped genres.
    pub static_filters: Option<fn() -> FilterList>,
    pub default_quality: &'static str,
}

impl DooPlayConfig {
    pub fn new(name: &'static str, lang: &'static str, base_url: &'static str) -> Self {
        Self {
            name,
            lang,
            base_url,
            popular_selector: "article.w_item_a > a",
            latest_path: if lang == "pt-BR" { "episodio" } else { "episodes" },
            latest_selector: "div.content article > div.poster",
            latest_next_page_selector: "div.resppages > a > span.fa-chevron-right",
            search_selector: "div.result-item div.image a",
            filter_results_selector: "div.content article > div.poster",
            episode_layout: EpisodeLayout::Seasons,
            fetch_genres: true,
            static_filters: None,
            default_quality: "720p",
        }
    }
}

/// User-facing strings that depend on the site language.
#[derive(Debug, Clone, Copy)]
pub struct Labels {
    pub lang: &'static str,
    pub movie: &'static str,
    pub season_prefix: &'static str,
    pub additional_info: &'static [&'static str],
    pub select_text: &'static str,
    pub filter_header: &'static str,
    pub genres_missing: &'static str,
    pub genre: &'static str,
}

pub fn labels(lang: &str) -> Labels {
    if lang == "pt-BR" {
        Labels {
            lang: "pt-BR",
            movie: "Filme",
            season_prefix: "Temporada",
            additional_info: &["Título", "Ano", "Temporadas", "Episódios"],
            select_text: "<Selecione>",
            filter_header: "NOTA: Filtros serão ignorados se usar a pesquisa por nome!",
            genres_missing: "Os gêneros aparecem depois da primeira listagem",
            genre: "Gênero",
        }
    } else {
        Labels {
            lang: "en",
            movie: "Movie",
            season_prefix: "Season",
            additional_info: &["Original", "First", "Last", "Seasons", "Episodes"],
            select_text: "<Select>",
            filter_header: "NOTE: Filters are going to be ignored if using search text!",
            genres_missing: "Genres show up after the first listing",
            genre: "Genre",
        }
    }
}

pub struct DooPlay {
    info: SourceInfo,
    config: DooPlayConfig,
    labels: Labels,
    ctx: SourceContext,
    resolver: Arc<dyn EmbedResolver>,
    genres: RwLock<Option<Vec<FilterOption>>>,
}

impl DooPlay {
    pub fn new(config: DooPlayConfig, ctx: SourceContext, resolver: Arc<dyn EmbedResolver>) -> Self {
        let base_url = ctx.base_url(config.name, config.base_url);
        let info = SourceInfo::new(config.name, config.lang, &base_url, true);
        Self {
            labels: labels(config.lang),
            info,
            config,
            ctx,
            resolver,
            genres: RwLock::new(None),
        }
    }

    fn base(&self) -> &str {
        &self.info.base_url
    }

    fn request(&self, url: &str) -> RequestBuilder {
        self.ctx.http.get(url).header("Referer", self.base())
    }

    async fn fetch(&self, url: &str) -> Result<Fetched> {
        self.ctx.http.fetch(self.request(url)).await
    }

    /// Episode pages link back to their series through the menu; details and
    /// episode lists always come from the series page.
    async fn real_anime_page(&self, page: Fetched) -> Result<Fetched> {
        match anime_menu_url(&page.body, &page.url) {
            Some(url) => {
                debug!(%url, "following episode page to its series");
                self.fetch(&url).await
            }
            None => Ok(page),
        }
    }

    async fn ensure_genres(&self) {
        if !self.config.fetch_genres || self.cached_genres().is_some() {
            return;
        }
        let page = match self.fetch(self.base()).await {
            Ok(page) => page,
            Err(err) => {
                warn!(source = self.config.name, error = %err, "could not fetch genres");
                return;
            }
        };
        let items = parse_genres(&page.body, self.base(), &self.labels);
        if items.is_empty() {
            return;
        }
        if let Ok(mut cache) = self.genres.write() {
            *cache = Some(items);
        }
    }

    fn cached_genres(&self) -> Option<Vec<FilterOption>> {
        self.genres.read().ok().and_then(|cache| cache.clone())
    }

    async fn embed_for(&self, option: PlayerOption, referer: &str) -> Result<Vec<Video>> {
        let ajax = format!("{}/wp-admin/admin-ajax.php", self.base());
        let form = [
            ("action", "doo_player_ajax"),
            ("post", option.post.as_str()),
            ("nume", option.nume.as_str()),
            ("type", option.kind.as_str()),
        ];
        let request = self
            .ctx
            .http
            .post(&ajax)
            .header("Referer", referer)
            .form(&form);
        let response = self.ctx.http.fetch(request).await?;
        let url = embed_url_from_ajax(&response.body)
            .ok_or_else(|| SourceError::not_found(format!("embed url for player {}", option.nume)))?;
        let embed = Embed {
            url,
            label: option.label,
            referer: format!("{}/", self.base()),
        };
        self.resolver.resolve(&self.ctx.http, &embed).await
    }
}

#[async_trait]
impl AnimeSource for DooPlay {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, _page: u32) -> Result<SeriesPage> {
        self.ensure_genres().await;
        let page = self.fetch(self.base()).await?;
        Ok(parse_listing(&page.body, &page.url, self.config.popular_selector, None))
    }

    async fn latest(&self, page: u32) -> Result<SeriesPage> {
        self.ensure_genres().await;
        let url = format!("{}/{}/page/{page}/", self.base(), self.config.latest_path);
        let fetched = self.fetch(&url).await?;
        Ok(parse_listing(
            &fetched.body,
            &fetched.url,
            self.config.latest_selector,
            Some(self.config.latest_next_page_selector),
        ))
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        if let Some(path) = query.strip_prefix(PATH_PREFIX) {
            let url = absolute(self.base(), path.trim());
            let fetched = self.fetch(&url).await?;
            let requested = fetched.url.clone();
            let real = self.real_anime_page(fetched).await?;
            let mut series = parse_details(&real.body, &real.url, self.config.lang)?;
            series.url = html::url_without_domain(&requested);
            return Ok(SeriesPage::single(series));
        }

        let next = Some(self.config.latest_next_page_selector);
        if !query.trim().is_empty() {
            let mut url = Url::parse(&format!("{}/page/{page}/", self.base()))?;
            url.query_pairs_mut().append_pair("s", query.trim());
            let fetched = self.fetch(url.as_str()).await?;
            return Ok(parse_search(
                &fetched.body,
                &fetched.url,
                self.config.search_selector,
                next,
            ));
        }

        match filters.first_active_uri_part() {
            Some(part) => {
                let part = part.trim_matches('/');
                let url = if page > 1 {
                    format!("{}/{part}/page/{page}", self.base())
                } else {
                    format!("{}/{part}", self.base())
                };
                let fetched = self.fetch(&url).await?;
                Ok(parse_listing(
                    &fetched.body,
                    &fetched.url,
                    self.config.filter_results_selector,
                    next,
                ))
            }
            None => self.popular(page).await,
        }
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let page = self.fetch(&absolute(self.base(), &series.url)).await?;
        let real = self.real_anime_page(page).await?;
        parse_details(&real.body, &real.url, self.config.lang)
    }

    async fn episodes(&self, series: &Series) -> Result<Vec<Episode>> {
        let url = absolute(self.base(), &series.url);
        let page = self.fetch(&url).await?;
        let requested = page.url.clone();
        let real = self.real_anime_page(page).await?;
        Ok(match self.config.episode_layout {
            EpisodeLayout::Seasons => parse_season_episodes(&real.body, &real.url, &self.labels),
            EpisodeLayout::Flat => parse_flat_episodes(&real.body, &requested, &self.labels),
        })
    }

    async fn videos(&self, episode: &Episode) -> Result<Vec<Video>> {
        let page = self.fetch(&absolute(self.base(), &episode.url)).await?;
        let options = player_options(&page.body);
        debug!(count = options.len(), url = %page.url, "player options");
        let referer = page.url.as_str();
        let mut videos = catching_flat_map(options, self.ctx.concurrency(), |option| {
            self.embed_for(option, referer)
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
        if let Some(build) = self.config.static_filters {
            return build();
        }
        match self.cached_genres() {
            Some(items) => FilterList::new(vec![
                Filter::header(self.labels.filter_header),
                Filter::Select(Select::new("genre", self.labels.genre, items)),
            ]),
            None if self.config.fetch_genres => {
                FilterList::new(vec![Filter::header(self.labels.genres_missing)])
            }
            None => FilterList::empty(),
        }
    }

    async fn refresh_filters(&self) -> Result<()> {
        self.ensure_genres().await;
        Ok(())
    }
}

/// One entry of the player switcher on an episode page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerOption {
    pub post: String,
    pub nume: String,
    pub kind: String,
    pub label: String,
}

/// Hoster options of an episode page. The `trailer` entry is skipped.
pub fn player_options(body: &str) -> Vec<PlayerOption> {
    let doc = html::parse(body);
    html::select_all(doc.root_element(), PLAYER_OPTIONS_SELECTOR)
        .into_iter()
        .filter(|li| html::attr(*li, "data-nume") != Some("trailer"))
        .filter_map(|li| {
            let get = |name: &str| html::attr(li, name).map(str::to_string);
            let label = html::select_first(li, "span.title")
                .map(html::text)
                .unwrap_or_else(|| html::text(li));
            Some(PlayerOption {
                post: get("data-post")?,
                nume: get("data-nume")?,
                kind: get("data-type")?,
                label,
            })
        })
        .collect()
}

/// Pulls the hoster URL out of a `doo_player_ajax` response, which is either
/// a bare URL or an `<iframe>` snippet.
pub fn embed_url_from_ajax(body: &str) -> Option<String> {
    let raw = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => json.get("embed_url")?.as_str()?.to_string(),
        Err(_) => body
            .split_once("\"embed_url\":\"")?
            .1
            .split("\",")
            .next()?
            .replace('\\', ""),
    };
    let raw = raw.trim();
    if raw.contains("<iframe") {
        let doc = html::parse(raw);
        let iframe = html::select_first(doc.root_element(), "iframe[src]")?;
        return html::attr(iframe, "src").map(str::to_string);
    }
    (!raw.is_empty()).then(|| raw.to_string())
}

pub fn parse_listing(body: &str, page_url: &str, item_css: &str, next_css: Option<&str>) -> SeriesPage {
    let doc = html::parse(body);
    let root = doc.root_element();
    let items = html::select_all(root, item_css)
        .into_iter()
        .filter_map(|el| series_from_element(el, page_url))
        .collect();
    let has_next = next_css.is_some_and(|css| html::select_first(root, css).is_some());
    SeriesPage::new(items, has_next)
}

pub fn parse_search(body: &str, page_url: &str, item_css: &str, next_css: Option<&str>) -> SeriesPage {
    let doc = html::parse(body);
    let root = doc.root_element();
    let items = html::select_all(root, item_css)
        .into_iter()
        .filter_map(|el| {
            let href = html::attr(el, "href")?;
            let img = html::select_first(el, "img")?;
            let mut series = Series::new(
                html::url_without_domain(&html::abs_url(page_url, href)?),
                html::attr(img, "alt").unwrap_or_default(),
            );
            series.thumbnail_url = html::image_url(img, page_url);
            Some(series)
        })
        .collect();
    let has_next = next_css.is_some_and(|css| html::select_first(root, css).is_some());
    SeriesPage::new(items, has_next)
}

fn series_from_element(el: ElementRef<'_>, page_url: &str) -> Option<Series> {
    let img = html::select_first(el, "img")?;
    let href = html::select_first(el, "a")
        .and_then(|a| html::attr(a, "href"))
        .or_else(|| html::attr(el, "href"))?;
    let mut series = Series::new(
        html::url_without_domain(&html::abs_url(page_url, href)?),
        html::attr(img, "alt").unwrap_or_default(),
    );
    series.thumbnail_url = html::image_url(img, page_url);
    Some(series)
}

/// Genre links from the site menu as uri-part options, led by a "nothing
/// selected" entry. Empty when the menu has no genre section.
pub fn parse_genres(body: &str, base_url: &str, labels: &Labels) -> Vec<FilterOption> {
    let doc = html::parse(body);
    let prefix = format!("{}/", base_url.trim_end_matches('/'));
    let mut items: Vec<FilterOption> = Vec::new();
    for menu in html::select_containing(doc.root_element(), "li", labels.genre) {
        for link in html::select_all(menu, "ul.sub-menu li > a") {
            let Some(href) = html::attr(link, "href") else {
                continue;
            };
            let value = href.strip_prefix(&prefix).unwrap_or(href).to_string();
            if !items.iter().any(|item| item.value == value) {
                items.push(FilterOption::new(html::text(link), value));
            }
        }
    }
    if !items.is_empty() {
        items.insert(0, FilterOption::new(labels.select_text, ""));
    }
    items
}

pub fn anime_menu_url(body: &str, page_url: &str) -> Option<String> {
    let doc = html::parse(body);
    let icon = html::select_first(doc.root_element(), ANIME_MENU_SELECTOR)?;
    let link = icon.parent().and_then(ElementRef::wrap)?;
    html::abs_attr(link, "href", page_url)
}

pub fn parse_details(body: &str, location: &str, lang: &str) -> Result<Series> {
    let doc = html::parse(body);
    let root = doc.root_element();
    let labels = labels(lang);
    let sheader = html::require(root, "div.sheader")?;
    let poster = html::require(sheader, "div.poster > img")?;

    let title = match html::attr(poster, "alt") {
        Some(alt) => alt.to_string(),
        None => html::text(html::require(sheader, "div.data > h1")?),
    };
    let mut series = Series::new(html::url_without_domain(location), title);
    series.thumbnail_url = html::image_url(poster, location);
    series.genres = html::each_text(&html::select_all(sheader, "div.data > div.sgeneros > a"));

    if let Some(info) = html::select_first(root, ADDITIONAL_INFO_SELECTOR) {
        let mut description = html::select_first(root, "div#info p")
            .map(|p| format!("{}\n", html::text(p)))
            .unwrap_or_default();
        for item in labels.additional_info {
            if let Some(line) = additional_info(info, item) {
                description.push_str(&line);
            }
        }
        series.description = Some(description);
    }
    Ok(series)
}

fn additional_info(info: ElementRef<'_>, item: &str) -> Option<String> {
    let target = html::select_containing(info, "div.custom_fields", item)
        .into_iter()
        .next()?;
    let key = html::text(html::select_first(target, "b")?);
    let value = html::text(html::select_first(target, "span")?);
    Some(format!("\n{key}: {value}"))
}

pub fn parse_season_episodes(body: &str, location: &str, labels: &Labels) -> Vec<Episode> {
    let doc = html::parse(body);
    let seasons = html::select_all(doc.root_element(), "div#seasons > div");
    if seasons.is_empty() {
        return vec![Episode::new(html::url_without_domain(location), labels.movie, 1.0)];
    }

    let mut episodes: Vec<Episode> = Vec::new();
    for season in seasons {
        let Some(season_name) = html::select_first(season, "span.se-t").map(html::text) else {
            debug!("season block without a name");
            continue;
        };
        for el in html::select_all(season, "ul.episodios > li") {
            match episode_from_element(el, location, labels.lang) {
                Some((mut episode, number, name)) => {
                    episode.name = format!(
                        "{} {season_name} x {number} - {name}",
                        labels.season_prefix
                    );
                    episodes.push(episode);
                }
                None => debug!(season = %season_name, "skipping malformed episode"),
            }
        }
    }
    episodes.reverse();
    episodes
}

/// Episodes of a single-list page. `requested` is the series URL that was
/// asked for, whose first path segment marks movies.
pub fn parse_flat_episodes(body: &str, requested: &str, labels: &Labels) -> Vec<Episode> {
    let doc = html::parse(body);
    let root = doc.root_element();
    let is_movie = Url::parse(requested)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next().map(str::to_ascii_lowercase))
        })
        .is_some_and(|first| first.contains("movie"));

    if is_movie {
        let mut episode = Episode::new(html::url_without_domain(requested), labels.movie, 0.0);
        episode.date_upload = html::select_first(root, "div.extra > span.date")
            .and_then(|date| dates::parse_site_date(&html::text(date), labels.lang, DATE_FORMATS));
        return vec![episode];
    }

    let mut episodes: Vec<Episode> = html::select_all(root, "ul.episodios > li")
        .into_iter()
        .filter_map(|el| episode_from_element(el, requested, labels.lang))
        .map(|(mut episode, _, name)| {
            episode.name = name;
            episode
        })
        .collect();
    episodes.reverse();
    episodes
}

/// The episode plus its raw number text and link text.
fn episode_from_element(
    el: ElementRef<'_>,
    page_url: &str,
    lang: &str,
) -> Option<(Episode, String, String)> {
    let numerando = html::text(html::select_first(el, "div.numerando")?);
    let number = EPISODE_NUMBER_RE
        .captures(numerando.trim())
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "0".to_string());
    let link = html::select_first(el, "a[href]")?;
    let href = html::abs_attr(link, "href", page_url)?;
    let name = html::own_text(link);

    let mut episode = Episode::new(
        html::url_without_domain(&href),
        name.clone(),
        number.parse().unwrap_or(0.0),
    );
    episode.date_upload = html::select_first(el, ".date")
        .and_then(|date| dates::parse_site_date(&html::text(date), lang, DATE_FORMATS));
    Some((episode, number, name))
}
