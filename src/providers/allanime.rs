use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{AnimeSource, MangaSource, SourceContext, SourceInfo};
use crate::error::{Result, SourceError};
use crate::filters::{CheckBoxGroup, Filter, FilterList, Select, options};
use crate::html;
use crate::parallel::catching_flat_map;
use crate::types::{
    Chapter, Episode, Page, Series, SeriesPage, SeriesStatus, Track, Translation, Video,
};

const ALLANIME_API_URL: &str = "https://api.allanime.day/api";
const ALLANIME_BASE_URL: &str = "https://allanime.day";
const ALLANIME_REFERER: &str = "https://allmanga.to";
const ALLANIME_ORIGIN: &str = "https://allanime.day";
const PAGE_SIZE: usize = 26;
const DEFAULT_QUALITY: &str = "1080p";

/// GraphQL endpoint shared by the anime and manga halves of the site.
#[derive(Debug, Clone)]
struct AllAnimeApi {
    ctx: SourceContext,
    api_url: String,
}

impl AllAnimeApi {
    fn new(ctx: SourceContext, name: &str) -> Self {
        let api_url = ctx.base_url(name, ALLANIME_API_URL);
        Self { ctx, api_url }
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let body = json!({ "query": query, "variables": variables });
        let request = self
            .ctx
            .http
            .post(&self.api_url)
            .header("Referer", ALLANIME_REFERER)
            .header("Origin", ALLANIME_ORIGIN)
            .header("Accept", "application/json")
            .json(&body);
        let envelope: GraphQlEnvelope<T> = self.ctx.http.fetch_json(request).await?;
        extract_data(envelope)
    }

    async fn clock(&self, path: &str) -> Result<(String, ClockResponse)> {
        let url = if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{ALLANIME_BASE_URL}{path}")
        };
        let request = self
            .ctx
            .http
            .get(&url)
            .header("Referer", ALLANIME_REFERER)
            .header("Origin", ALLANIME_ORIGIN)
            .header("Accept", "application/json");
        let response = self.ctx.http.fetch_json(request).await?;
        Ok((url, response))
    }

    fn translation(&self, name: &str) -> Translation {
        self.ctx
            .prefs(name)
            .translation
            .as_deref()
            .and_then(Translation::parse)
            .unwrap_or(Translation::Sub)
    }

    async fn popular(&self, kind: &str, page: u32) -> Result<SeriesPage> {
        let payload: PopularPayload = self
            .query(
                POPULAR_QUERY,
                json!({ "type": kind, "size": PAGE_SIZE, "dateRange": 7, "page": page }),
            )
            .await?;
        Ok(popular_page(payload))
    }
}

fn extract_data<T>(envelope: GraphQlEnvelope<T>) -> Result<T> {
    if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
        let joined = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SourceError::parse(format!("AllAnime API error: {joined}")));
    }
    envelope
        .data
        .ok_or_else(|| SourceError::not_found("AllAnime response data"))
}

/// Search variables shared by `shows` and `mangas`.
pub fn search_variables(
    page: u32,
    query: &str,
    filters: &FilterList,
    translation: Translation,
) -> Value {
    let mut search = json!({ "allowAdult": false, "allowUnknown": false });
    let mut origin = "ALL".to_string();
    let query = query.trim();
    if !query.is_empty() {
        search["query"] = json!(query);
    } else {
        for (key, value) in filters.query_pairs() {
            match key.as_str() {
                "origin" => origin = value,
                "year" => {
                    if let Ok(year) = value.parse::<i32>() {
                        search["year"] = json!(year);
                    }
                }
                "genres" | "types" => {
                    if !search[key.as_str()].is_array() {
                        search[key.as_str()] = json!([]);
                    }
                    if let Some(list) = search[key.as_str()].as_array_mut() {
                        list.push(json!(value));
                    }
                }
                _ => search[key.as_str()] = json!(value),
            }
        }
    }
    json!({
        "search": search,
        "limit": PAGE_SIZE,
        "page": page,
        "translationType": translation.as_str(),
        "countryOrigin": origin,
    })
}

fn common_filters() -> Vec<Filter> {
    vec![
        Filter::header("Filters are ignored with a text query"),
        Filter::Select(Select::new(
            "origin",
            "Origin",
            options(&[("All", ""), ("Japan", "JP"), ("China", "CN"), ("Korea", "KR")]),
        )),
        Filter::Select(Select::new(
            "sortBy",
            "Sort By",
            options(&[
                ("Update", ""),
                ("Name Asc", "Name_ASC"),
                ("Name Desc", "Name_DESC"),
                ("Top", "Top"),
            ]),
        )),
        Filter::text("year", "Year"),
        Filter::CheckBoxGroup(CheckBoxGroup::new(
            "genres",
            "Genres",
            options(&[
                ("Action", "Action"),
                ("Adventure", "Adventure"),
                ("Comedy", "Comedy"),
                ("Drama", "Drama"),
                ("Fantasy", "Fantasy"),
                ("Horror", "Horror"),
                ("Mystery", "Mystery"),
                ("Romance", "Romance"),
                ("Sci-Fi", "Sci-Fi"),
                ("Slice of Life", "Slice of Life"),
                ("Sports", "Sports"),
                ("Supernatural", "Supernatural"),
            ]),
        )),
    ]
}

pub fn popular_page(payload: PopularPayload) -> SeriesPage {
    let items: Vec<Series> = payload
        .query_popular
        .recommendations
        .into_iter()
        .filter_map(|rec| rec.any_card)
        .map(Card::into_series)
        .collect();
    let has_next = items.len() == PAGE_SIZE;
    SeriesPage::new(items, has_next)
}

fn edges_page(edges: Vec<Card>) -> SeriesPage {
    let has_next = edges.len() == PAGE_SIZE;
    SeriesPage::new(edges.into_iter().map(Card::into_series).collect(), has_next)
}

pub fn parse_status(status: Option<&str>) -> SeriesStatus {
    match status {
        Some("Releasing") | Some("Not Yet Released") => SeriesStatus::Ongoing,
        Some("Finished") => SeriesStatus::Completed,
        _ => SeriesStatus::Unknown,
    }
}

/// Descriptions arrive as HTML with `<br>` line breaks.
pub fn plain_description(raw: &str) -> String {
    let with_breaks = raw
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n");
    let doc = html::parse(&with_breaks);
    html::data(doc.root_element()).trim().to_string()
}

pub fn show_details(show: ShowDetail, title: &str) -> Series {
    let mut series = Series::new(show.id.clone(), if title.is_empty() { show.name.as_str() } else { title });
    let mut description = plain_description(show.description.as_deref().unwrap_or_default());
    description.push_str("\n\n");
    description.push_str(&format!("Type: {}", show.kind.as_deref().unwrap_or("Unknown")));
    let (quarter, year) = show
        .season
        .as_ref()
        .map(|s| {
            (
                s.quarter.clone().unwrap_or_else(|| "-".into()),
                s.year.map_or_else(|| "-".into(), |y| y.to_string()),
            )
        })
        .unwrap_or_else(|| ("-".into(), "-".into()));
    description.push_str(&format!("\nAired: {quarter} {year}"));
    let score = show.score.map_or_else(|| "-".into(), |s| s.to_string());
    description.push_str(&format!("\nScore: {score}★"));
    series.description = Some(description);
    series.thumbnail_url = show.thumbnail;
    series.genres = show.genres.unwrap_or_default();
    series.status = parse_status(show.status.as_deref());
    series.author = show.studios.and_then(|s| s.into_iter().next());
    series
}

/// Episode urls encode what the `episode` query needs: `{show}/{translation}/{episode}`.
pub fn episode_list(show_id: &str, detail: &EpisodeDetail, translation: Translation) -> Vec<Episode> {
    let (list, tt) = match translation {
        Translation::Dub => (&detail.dub, Translation::Dub),
        _ => (&detail.sub, Translation::Sub),
    };
    list.iter()
        .map(|ep| {
            Episode::new(
                format!("{show_id}/{}/{ep}", tt.as_str()),
                format!("Episode {ep} ({})", tt.as_str()),
                ep.parse().unwrap_or(0.0),
            )
        })
        .collect()
}

pub fn chapter_list(manga_id: &str, detail: &ChapterDetail, translation: Translation) -> Vec<Chapter> {
    let (list, tt) = match translation {
        Translation::Raw => (&detail.raw, Translation::Raw),
        _ => (&detail.sub, Translation::Sub),
    };
    list.iter()
        .map(|ch| {
            Chapter::new(
                format!("{manga_id}/{}/{ch}", tt.as_str()),
                format!("Chapter {ch}"),
                ch.parse().unwrap_or(-1.0),
            )
        })
        .collect()
}

/// Orders hoster videos best first. The first key is the preferred server
/// name, or the API's own source priority when no server (or
/// `site_default`) is configured; ties break on the preferred quality and
/// then the translation token.
pub fn priority_sort(
    videos: Vec<(Video, f32)>,
    server: Option<&str>,
    quality: &str,
    translation: &str,
) -> Vec<Video> {
    let server = server
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("site_default"))
        .map(str::to_lowercase);
    let quality = quality.to_lowercase();
    let translation = translation.to_lowercase();
    let mut keyed: Vec<_> = videos
        .into_iter()
        .map(|(video, priority)| {
            let label = video.quality.to_lowercase();
            let first = match &server {
                Some(server) if label.contains(server.as_str()) => 1.0,
                Some(_) => 0.0,
                None => priority,
            };
            let keys = (first, label.contains(&quality), label.contains(&translation));
            (keys, video)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        b.0.total_cmp(&a.0)
            .then_with(|| b.1.cmp(&a.1))
            .then_with(|| b.2.cmp(&a.2))
    });
    keyed.into_iter().map(|(_, video)| video).collect()
}

/// Splits `{id}/{translation}/{number}`.
pub fn split_item_url(url: &str) -> Result<(&str, Translation, &str)> {
    let mut parts = url.trim_matches('/').splitn(3, '/');
    match (parts.next(), parts.next().and_then(Translation::parse), parts.next()) {
        (Some(id), Some(tt), Some(number)) if !id.is_empty() => Ok((id, tt, number)),
        _ => Err(SourceError::parse(format!("malformed AllAnime url `{url}`"))),
    }
}

pub fn clock_videos(source_name: &str, page_url: &str, response: ClockResponse) -> Vec<Video> {
    response
        .links
        .into_iter()
        .map(|link| {
            let quality = link.resolution.unwrap_or_else(|| "auto".to_string());
            let mut video = Video::new(page_url, format!("{source_name} - {quality}"), link.link);
            video.headers = link.headers;
            if !video.headers.keys().any(|k| k.eq_ignore_ascii_case("referer")) {
                video
                    .headers
                    .insert("Referer".to_string(), ALLANIME_REFERER.to_string());
            }
            video.subtitles = link
                .subtitles
                .into_iter()
                .map(|sub| Track {
                    url: sub.src,
                    lang: sub.label.or(sub.lang).unwrap_or_else(|| "Unknown".to_string()),
                })
                .collect();
            video
        })
        .collect()
}

pub fn pages_from_edges(connection: ChapterPagesConnection) -> Vec<Page> {
    let Some(edge) = connection.edges.into_iter().next() else {
        return Vec::new();
    };
    edge.picture_urls
        .into_iter()
        .enumerate()
        .map(|(index, picture)| {
            let url = if picture.url.starts_with("http") {
                picture.url
            } else {
                format!("{}{}", edge.picture_url_head, picture.url)
            };
            let mut page = Page::image(index, url);
            page.headers
                .insert("Referer".to_string(), ALLANIME_REFERER.to_string());
            page
        })
        .collect()
}

/// Hoster paths come obfuscated as `--` followed by hex byte pairs.
pub fn decode_provider_path(raw: &str) -> Option<String> {
    let bytes = raw.strip_prefix("--")?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut decoded = String::with_capacity(bytes.len() / 2);
    for chunk in bytes.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).ok()?.to_ascii_lowercase();
        decoded.push(decode_pair(&pair)?);
    }
    if decoded.contains("/clock") && !decoded.contains(".json") {
        decoded = decoded.replacen("/clock", "/clock.json", 1);
    }
    Some(decoded)
}

fn decode_pair(pair: &str) -> Option<char> {
    // Each pair is the byte XOR 0x38.
    let byte = u8::from_str_radix(pair, 16).ok()? ^ 0x38;
    let ch = char::from(byte);
    (ch.is_ascii_alphanumeric() || "-._~:/?#[]@!$&()*+,;=%".contains(ch)).then_some(ch)
}

pub struct AllAnime {
    info: SourceInfo,
    api: AllAnimeApi,
}

impl AllAnime {
    pub fn new(ctx: SourceContext) -> Self {
        let api = AllAnimeApi::new(ctx, "AllAnime");
        Self {
            info: SourceInfo::new("AllAnime", "en", &api.api_url, true),
            api,
        }
    }

    async fn source_videos(&self, source: SourceDescriptor) -> Result<Vec<(Video, f32)>> {
        let priority = source.priority;
        if let Some(path) = decode_provider_path(&source.source_url) {
            let (url, response) = self.api.clock(&path).await?;
            let videos = clock_videos(&source.source_name, &url, response);
            return Ok(videos.into_iter().map(|v| (v, priority)).collect());
        }
        if source.kind.as_deref() == Some("player") {
            let label = format!("Original (player {})", source.source_name);
            let video = Video::new(&source.source_url, label, &source.source_url);
            return Ok(vec![(video, priority)]);
        }
        debug!(source = %source.source_name, "skipping unsupported hoster");
        Ok(Vec::new())
    }

    async fn shows(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        let variables = search_variables(page, query, filters, self.api.translation(&self.info.name));
        let payload: SearchPayload = self.api.query(SEARCH_SHOWS_QUERY, variables).await?;
        Ok(edges_page(payload.shows.edges))
    }
}

#[async_trait]
impl AnimeSource for AllAnime {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, page: u32) -> Result<SeriesPage> {
        self.api.popular("anime", page).await
    }

    async fn latest(&self, page: u32) -> Result<SeriesPage> {
        self.shows(page, "", &FilterList::empty()).await
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        self.shows(page, query, filters).await
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let payload: ShowDetailPayload = self
            .api
            .query(SHOW_DETAIL_QUERY, json!({ "showId": series.url }))
            .await?;
        Ok(show_details(payload.show, &series.title))
    }

    async fn episodes(&self, series: &Series) -> Result<Vec<Episode>> {
        let payload: ShowEpisodesPayload = self
            .api
            .query(SHOW_EPISODES_QUERY, json!({ "showId": series.url }))
            .await?;
        Ok(episode_list(
            &series.url,
            &payload.show.available_episodes_detail,
            self.api.translation(&self.info.name),
        ))
    }

    async fn videos(&self, episode: &Episode) -> Result<Vec<Video>> {
        let (show_id, translation, number) = split_item_url(&episode.url)?;
        let payload: EpisodePayload = self
            .api
            .query(
                EPISODE_SOURCES_QUERY,
                json!({
                    "showId": show_id,
                    "translationType": translation.as_str(),
                    "episodeString": number,
                }),
            )
            .await?;
        let videos = catching_flat_map(
            payload.episode.source_urls,
            self.api.ctx.concurrency(),
            |source| self.source_videos(source),
        )
        .await;
        let prefs = self.api.ctx.prefs(&self.info.name);
        Ok(priority_sort(
            videos,
            prefs.preferred_server.as_deref(),
            prefs.preferred_quality.as_deref().unwrap_or(DEFAULT_QUALITY),
            translation.as_str(),
        ))
    }

    fn filters(&self) -> FilterList {
        let mut filters = common_filters();
        filters.push(Filter::Select(Select::new(
            "season",
            "Season",
            options(&[
                ("All", ""),
                ("Winter", "Winter"),
                ("Spring", "Spring"),
                ("Summer", "Summer"),
                ("Fall", "Fall"),
            ]),
        )));
        filters.push(Filter::CheckBoxGroup(CheckBoxGroup::new(
            "types",
            "Types",
            options(&[
                ("Movie", "Movie"),
                ("ONA", "ONA"),
                ("OVA", "OVA"),
                ("Special", "Special"),
                ("TV", "TV"),
            ]),
        )));
        FilterList::new(filters)
    }
}

pub struct AllManga {
    info: SourceInfo,
    api: AllAnimeApi,
}

impl AllManga {
    pub fn new(ctx: SourceContext) -> Self {
        let api = AllAnimeApi::new(ctx, "AllManga");
        Self {
            info: SourceInfo::new("AllManga", "en", &api.api_url, true),
            api,
        }
    }

    async fn mangas(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        let translation = match self.api.translation(&self.info.name) {
            Translation::Raw => Translation::Raw,
            _ => Translation::Sub,
        };
        let variables = search_variables(page, query, filters, translation);
        let payload: SearchMangaPayload = self.api.query(SEARCH_MANGAS_QUERY, variables).await?;
        Ok(edges_page(payload.mangas.edges))
    }
}

#[async_trait]
impl MangaSource for AllManga {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn popular(&self, page: u32) -> Result<SeriesPage> {
        self.api.popular("manga", page).await
    }

    async fn latest(&self, page: u32) -> Result<SeriesPage> {
        self.mangas(page, "", &FilterList::empty()).await
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage> {
        self.mangas(page, query, filters).await
    }

    async fn details(&self, series: &Series) -> Result<Series> {
        let payload: MangaDetailPayload = self
            .api
            .query(MANGA_DETAIL_QUERY, json!({ "mangaId": series.url }))
            .await?;
        let manga = payload.manga;
        let mut out = Series::new(
            series.url.clone(),
            if series.title.is_empty() { manga.name } else { series.title.clone() },
        );
        out.thumbnail_url = manga.thumbnail;
        out.description = manga.description.as_deref().map(plain_description);
        out.genres = manga.genres.unwrap_or_default();
        out.status = parse_status(manga.status.as_deref());
        Ok(out)
    }

    async fn chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        let payload: MangaDetailPayload = self
            .api
            .query(MANGA_DETAIL_QUERY, json!({ "mangaId": series.url }))
            .await?;
        Ok(chapter_list(
            &series.url,
            &payload.manga.available_chapters_detail,
            self.api.translation(&self.info.name),
        ))
    }

    async fn pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        let (manga_id, translation, number) = split_item_url(&chapter.url)?;
        let payload: ChapterPagesPayload = self
            .api
            .query(
                CHAPTER_PAGES_QUERY,
                json!({
                    "mangaId": manga_id,
                    "translationType": translation.as_str(),
                    "chapterString": number,
                }),
            )
            .await?;
        Ok(pages_from_edges(payload.chapter_pages))
    }

    fn filters(&self) -> FilterList {
        FilterList::new(common_filters())
    }
}

// --- GraphQL Structs ---

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct Card {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    thumbnail: Option<String>,
}

impl Card {
    fn into_series(self) -> Series {
        let mut series = Series::new(self.id, self.name);
        series.thumbnail_url = self.thumbnail;
        series
    }
}

#[derive(Debug, Deserialize)]
pub struct PopularPayload {
    #[serde(rename = "queryPopular")]
    query_popular: QueryPopular,
}

#[derive(Debug, Deserialize)]
struct QueryPopular {
    #[serde(default)]
    recommendations: Vec<Recommendation>,
}

#[derive(Debug, Deserialize)]
struct Recommendation {
    #[serde(rename = "anyCard")]
    any_card: Option<Card>,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    shows: Edges,
}

#[derive(Debug, Deserialize)]
struct SearchMangaPayload {
    mangas: Edges,
}

#[derive(Debug, Deserialize)]
struct Edges {
    #[serde(default)]
    edges: Vec<Card>,
}

#[derive(Debug, Deserialize)]
struct ShowDetailPayload {
    show: ShowDetail,
}

#[derive(Debug, Deserialize)]
pub struct ShowDetail {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    thumbnail: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    season: Option<AiredSeason>,
    score: Option<f64>,
    genres: Option<Vec<String>>,
    status: Option<String>,
    studios: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AiredSeason {
    quarter: Option<String>,
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ShowEpisodesPayload {
    show: ShowEpisodes,
}

#[derive(Debug, Deserialize)]
struct ShowEpisodes {
    #[serde(rename = "availableEpisodesDetail")]
    #[serde(default)]
    available_episodes_detail: EpisodeDetail,
}

#[derive(Debug, Deserialize, Default)]
pub struct EpisodeDetail {
    #[serde(default)]
    sub: Vec<String>,
    #[serde(default)]
    dub: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MangaDetailPayload {
    manga: MangaDetail,
}

#[derive(Debug, Deserialize)]
struct MangaDetail {
    #[serde(default)]
    name: String,
    thumbnail: Option<String>,
    description: Option<String>,
    genres: Option<Vec<String>>,
    status: Option<String>,
    #[serde(rename = "availableChaptersDetail")]
    #[serde(default)]
    available_chapters_detail: ChapterDetail,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChapterDetail {
    #[serde(default)]
    sub: Vec<String>,
    #[serde(default)]
    raw: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterPagesPayload {
    #[serde(rename = "chapterPages")]
    chapter_pages: ChapterPagesConnection,
}

#[derive(Debug, Deserialize)]
pub struct ChapterPagesConnection {
    #[serde(default)]
    edges: Vec<ChapterPageEdge>,
}

#[derive(Debug, Deserialize)]
struct ChapterPageEdge {
    #[serde(rename = "pictureUrlHead")]
    #[serde(default)]
    picture_url_head: String,
    #[serde(rename = "pictureUrls")]
    picture_urls: Vec<PictureUrl>,
}

#[derive(Debug, Deserialize)]
struct PictureUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct EpisodePayload {
    episode: EpisodeSources,
}

#[derive(Debug, Deserialize)]
struct EpisodeSources {
    #[serde(rename = "sourceUrls")]
    source_urls: Vec<SourceDescriptor>,
}

#[derive(Debug, Deserialize)]
struct SourceDescriptor {
    #[serde(rename = "sourceUrl")]
    source_url: String,
    #[serde(rename = "sourceName")]
    source_name: String,
    #[serde(rename = "type")]
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    priority: f32,
}

#[derive(Debug, Deserialize)]
pub struct ClockResponse {
    links: Vec<ClockLink>,
}

#[derive(Debug, Deserialize)]
struct ClockLink {
    link: String,
    #[serde(rename = "resolutionStr")]
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    subtitles: Vec<ClockSubtitle>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ClockSubtitle {
    src: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

// --- Queries ---

const POPULAR_QUERY: &str = r#"query($type: VaildPopularTypeEnumType!, $size: Int!, $page: Int, $dateRange: Int) {
  queryPopular(type: $type, size: $size, dateRange: $dateRange, page: $page) {
    total
    recommendations {
      anyCard {
        _id
        name
        thumbnail
      }
    }
  }
}"#;

const SEARCH_SHOWS_QUERY: &str = r#"query($search: SearchInput, $limit: Int, $page: Int, $translationType: VaildTranslationTypeEnumType, $countryOrigin: VaildCountryOriginEnumType) {
  shows(search: $search, limit: $limit, page: $page, translationType: $translationType, countryOrigin: $countryOrigin) {
    edges {
      _id
      name
      thumbnail
    }
  }
}"#;

const SHOW_DETAIL_QUERY: &str = r#"query($showId: String!) {
  show(_id: $showId) {
    _id
    name
    thumbnail
    description
    type
    season
    score
    genres
    status
    studios
  }
}"#;

const SHOW_EPISODES_QUERY: &str = r#"query($showId: String!) {
  show(_id: $showId) {
    _id
    availableEpisodesDetail
  }
}"#;

const EPISODE_SOURCES_QUERY: &str = r#"query($showId: String!, $translationType: VaildTranslationTypeEnumType!, $episodeString: String!) {
  episode(showId: $showId, translationType: $translationType, episodeString: $episodeString) {
    episodeString
    sourceUrls
  }
}"#;

const SEARCH_MANGAS_QUERY: &str = r#"query($search: SearchInput, $limit: Int, $page: Int, $translationType: VaildTranslationTypeMangaEnumType, $countryOrigin: VaildCountryOriginEnumType) {
  mangas(search: $search, limit: $limit, page: $page, translationType: $translationType, countryOrigin: $countryOrigin) {
    edges {
      _id
      name
      thumbnail
    }
  }
}"#;

const MANGA_DETAIL_QUERY: &str = r#"query($mangaId: String!) {
  manga(_id: $mangaId) {
    _id
    name
    thumbnail
    description
    genres
    status
    availableChaptersDetail
  }
}"#;

const CHAPTER_PAGES_QUERY: &str = r#"query($mangaId: String!, $translationType: VaildTranslationTypeMangaEnumType!, $chapterString: String!) {
  chapterPages(mangaId: $mangaId, translationType: $translationType, chapterString: $chapterString) {
    edges {
      pictureUrlHead
      pictureUrls
    }
  }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_clock_paths() {
        // "/apivtwo/clock?id=7d"
        let encoded = "--175948514e4c4f57175b54575b5307515c050f5c";
        assert_eq!(
            decode_provider_path(encoded).as_deref(),
            Some("/apivtwo/clock.json?id=7d")
        );
        assert!(decode_provider_path("https://direct.example/v.mp4").is_none());
        assert!(decode_provider_path("--abc").is_none());
    }

    #[test]
    fn clock_links_become_videos() {
        let response: ClockResponse = serde_json::from_str(
            r#"{"links":[
                {"link":"https://cdn.example/1080.mp4","resolutionStr":"1080p",
                 "subtitles":[{"src":"https://cdn.example/en.vtt","lang":"en","label":"English"}]},
                {"link":"https://cdn.example/master.m3u8","hls":true,
                 "headers":{"referer":"https://player.example/"}}
            ]}"#,
        )
        .unwrap();
        let videos = clock_videos("S-mp4", "https://allanime.day/apivtwo/clock.json?id=1", response);
        assert_eq!(videos[0].quality, "S-mp4 - 1080p");
        assert_eq!(videos[0].headers.get("Referer").map(String::as_str), Some(ALLANIME_REFERER));
        assert_eq!(videos[0].subtitles[0].lang, "English");
        assert_eq!(videos[1].quality, "S-mp4 - auto");
        assert_eq!(videos[1].video_url, "https://cdn.example/master.m3u8");
        assert!(!videos[1].headers.contains_key("Referer"));
    }

    fn ranked(label: &str, priority: f32) -> (Video, f32) {
        (Video::new("https://allanime.day/", label, "https://cdn.example/v.mp4"), priority)
    }

    #[test]
    fn source_priority_orders_videos_by_default() {
        let descriptors: Vec<SourceDescriptor> = serde_json::from_str(
            r#"[{"sourceUrl":"--01","sourceName":"Yt-mp4","priority":7.9},
                {"sourceUrl":"--02","sourceName":"S-mp4","priority":8.5},
                {"sourceUrl":"--03","sourceName":"Ok"}]"#,
        )
        .unwrap();
        assert_eq!(descriptors[2].priority, 0.0);

        let videos = vec![
            ranked("Yt-mp4 - 1080p", descriptors[0].priority),
            ranked("S-mp4 - 720p", descriptors[1].priority),
            ranked("Ok - 1080p", descriptors[2].priority),
        ];
        let sorted = priority_sort(videos, None, "1080", "sub");
        let labels: Vec<_> = sorted.iter().map(|v| v.quality.as_str()).collect();
        assert_eq!(labels, ["S-mp4 - 720p", "Yt-mp4 - 1080p", "Ok - 1080p"]);
    }

    #[test]
    fn preferred_server_outranks_priority() {
        let videos = vec![
            ranked("S-mp4 - 1080p", 8.5),
            ranked("Luf-mp4 - 720p", 7.0),
            ranked("Luf-mp4 - 1080p", 7.0),
        ];
        let sorted = priority_sort(videos, Some("luf-mp4"), "1080", "sub");
        let labels: Vec<_> = sorted.iter().map(|v| v.quality.as_str()).collect();
        assert_eq!(labels, ["Luf-mp4 - 1080p", "Luf-mp4 - 720p", "S-mp4 - 1080p"]);

        let videos = vec![ranked("A - 720p", 1.0), ranked("B - 1080p", 1.0)];
        let sorted = priority_sort(videos, Some("site_default"), "1080", "sub");
        assert_eq!(sorted[0].quality, "B - 1080p");
    }

    #[test]
    fn latest_variables_have_no_sort_and_all_origins() {
        let vars = search_variables(1, "", &FilterList::empty(), Translation::Sub);
        assert!(vars["search"].get("sortBy").is_none());
        assert!(vars["search"].get("query").is_none());
        assert_eq!(vars["countryOrigin"], "ALL");
        assert_eq!(vars["translationType"], "sub");
        assert_eq!(vars["page"], 1);
    }

    #[test]
    fn search_variables_use_query_or_filters() {
        let vars = search_variables(2, " frieren ", &FilterList::empty(), Translation::Dub);
        assert_eq!(vars["search"]["query"], "frieren");
        assert_eq!(vars["page"], 2);
        assert_eq!(vars["translationType"], "dub");
        assert_eq!(vars["countryOrigin"], "ALL");

        let anime = AnimeSource::filters(&AllAnime::new(
            SourceContext::new(crate::config::Settings::default()).unwrap(),
        ));
        let mut filters = anime;
        filters.apply_state("origin", "JP").unwrap();
        filters.apply_state("year", "2023").unwrap();
        filters.apply_state("genres", "Action,Drama").unwrap();
        filters.apply_state("season", "Fall").unwrap();
        let vars = search_variables(1, "", &filters, Translation::Sub);
        assert_eq!(vars["countryOrigin"], "JP");
        assert_eq!(vars["search"]["year"], 2023);
        assert_eq!(vars["search"]["genres"], json!(["Action", "Drama"]));
        assert_eq!(vars["search"]["season"], "Fall");
        assert!(vars["search"].get("query").is_none());
    }

    #[test]
    fn details_build_description_block() {
        let show: ShowDetail = serde_json::from_str(
            r#"{"_id":"abc","name":"Frieren","description":"An elf<br>and her journey.",
                "type":"TV","season":{"quarter":"Fall","year":2023},"score":9.1,
                "genres":["Adventure","Drama"],"status":"Releasing","studios":["Madhouse"]}"#,
        )
        .unwrap();
        let series = show_details(show, "");
        assert_eq!(series.url, "abc");
        assert_eq!(series.title, "Frieren");
        assert_eq!(
            series.description.as_deref(),
            Some("An elf\nand her journey.\n\nType: TV\nAired: Fall 2023\nScore: 9.1★")
        );
        assert_eq!(series.status, SeriesStatus::Ongoing);
        assert_eq!(series.author.as_deref(), Some("Madhouse"));
    }

    #[test]
    fn item_urls_carry_translation() {
        let detail: EpisodeDetail =
            serde_json::from_str(r#"{"sub":["12","11.5"],"dub":["1"]}"#).unwrap();
        let episodes = episode_list("abc", &detail, Translation::Sub);
        assert_eq!(episodes[0].url, "abc/sub/12");
        assert_eq!(episodes[1].number, 11.5);
        assert_eq!(episode_list("abc", &detail, Translation::Dub)[0].name, "Episode 1 (dub)");

        let (id, tt, number) = split_item_url("abc/raw/3").unwrap();
        assert_eq!((id, tt, number), ("abc", Translation::Raw, "3"));
        assert!(split_item_url("abc/xx/3").is_err());
    }

    #[test]
    fn chapter_pages_join_url_head() {
        let connection: ChapterPagesConnection = serde_json::from_str(
            r#"{"edges":[{"pictureUrlHead":"https://img.example/","pictureUrls":[
                {"url":"a/1.jpg"},{"url":"https://other.example/2.jpg"}]}]}"#,
        )
        .unwrap();
        let pages = pages_from_edges(connection);
        assert_eq!(pages[0].image_url.as_deref(), Some("https://img.example/a/1.jpg"));
        assert_eq!(pages[1].image_url.as_deref(), Some("https://other.example/2.jpg"));
        assert_eq!(pages[1].headers.get("Referer").map(String::as_str), Some(ALLANIME_REFERER));
    }
}
