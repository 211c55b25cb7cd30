//! DonghuaX, a pt-BR DooPlay site with fixed path filters and its own players.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::extractors::{self, host_of};
use crate::filters::{Filter, FilterList, FilterOption, Select, options};
use crate::html;
use crate::http::HttpClient;
use crate::providers::SourceContext;
use crate::themes::dooplay::{DooPlay, DooPlayConfig, EpisodeLayout, labels};
use crate::themes::{Embed, EmbedResolver};
use crate::types::Video;

const DONGHUAX_BASE_URL: &str = "https://donghuax.com";

static ALLVIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[(.*?)\](https?://(?:www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_\+.~#?&/=]*))",
    )
    .expect("valid regex")
});

pub fn config() -> DooPlayConfig {
    DooPlayConfig {
        popular_selector: "div > aside article.w_item_a",
        latest_path: "donghua",
        latest_selector: "div#archive-content > article.item",
        latest_next_page_selector: "div.pagination > span.current + a",
        filter_results_selector: "div.items > article.item",
        episode_layout: EpisodeLayout::Flat,
        fetch_genres: false,
        static_filters: Some(filters),
        ..DooPlayConfig::new("DonghuaX", "pt-BR", DONGHUAX_BASE_URL)
    }
}

pub fn new(ctx: SourceContext) -> DooPlay {
    let config = config();
    let base_url = ctx.base_url(config.name, config.base_url);
    let host = host_of(&base_url).unwrap_or_else(|| "donghuax.com".to_string());
    DooPlay::new(config, ctx, Arc::new(DonghuaXEmbeds { host }))
}

/// Only the first chosen filter is used; each option is a site path.
fn filters() -> FilterList {
    let labels = labels("pt-BR");
    let select = labels.select_text;

    let genres = [
        ("Ação", "acao"),
        ("Artes Marciais", "artes-marciais"),
        ("Aventura", "aventura"),
        ("BL", "bl"),
        ("Comédia", "comedia"),
        ("Drama", "drama"),
        ("Escolar", "escolar"),
        ("Fantasia", "fantasia"),
        ("Ficção Científica", "ficcao-cientifica"),
        ("Gourmet", "gourmet"),
        ("Harem", "harem"),
        ("Histórico", "historico"),
        ("Mistério", "misterio"),
        ("Mitologia", "mitologia"),
        ("Reencarnação", "reencarnacao"),
        ("Romance", "romance"),
        ("Slice of Life", "slice-of-life"),
        ("Sobrenatural", "sobrenatural"),
        ("Suspense", "suspense"),
        ("Vampiro", "vampiro"),
        ("Viagem no Tempo", "viagem-no-tempo"),
        ("Video Game", "video-game"),
    ];
    let mut genre_options = options(&[(select, "")]);
    genre_options.extend(
        genres
            .iter()
            .map(|(label, slug)| FilterOption::new(*label, format!("genero/{slug}/"))),
    );

    let mut year_options = options(&[(select, "")]);
    year_options.extend((2014..=2023).rev().map(|year| {
        FilterOption::new(year.to_string(), format!("ano/{year}/"))
    }));

    let mut letter_options = options(&[(select, ""), ("#", "letra/0-9")]);
    letter_options.extend(('a'..='z').map(|letter| {
        FilterOption::new(
            letter.to_ascii_uppercase().to_string(),
            format!("letra/{letter}"),
        )
    }));

    FilterList::new(vec![
        Filter::header(labels.filter_header),
        Filter::Select(Select::new("genre", "Gêneros", genre_options)),
        Filter::Select(Select::new("year", "Anos", year_options)),
        Filter::Select(Select::new("letter", "Letra", letter_options)),
    ])
}

/// Players hosted by the site itself plus the few third-party hosts it embeds.
pub struct DonghuaXEmbeds {
    host: String,
}

#[async_trait]
impl EmbedResolver for DonghuaXEmbeds {
    async fn resolve(&self, http: &HttpClient, embed: &Embed) -> Result<Vec<Video>> {
        let url = embed.url.as_str();
        match hoster(url, &self.host) {
            Hoster::JwPlayer => Ok(jwplayer_video(url).into_iter().collect()),
            Hoster::InternalPlayer => {
                let page = http.get_text(url).await?;
                Ok(internal_player_videos(&page.body))
            }
            Hoster::AllVideo => {
                let page = http.get_text(url).await?;
                Ok(allvideo_videos(&page.body))
            }
            Hoster::Blogger => {
                let request = http.get(url).header("Referer", embed.referer.as_str());
                let page = http.fetch(request).await?;
                Ok(blogger_videos(&page.body))
            }
            Hoster::Other => {
                debug!(%url, "no dedicated player, trying generic extraction");
                extractors::resolve_embed(http, url, &embed.label, Some(&embed.referer)).await
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hoster {
    JwPlayer,
    InternalPlayer,
    AllVideo,
    Blogger,
    Other,
}

pub fn hoster(url: &str, host: &str) -> Hoster {
    let lower = url.to_lowercase();
    let host = host.to_lowercase();
    if lower.contains(&format!("{host}/jwplayer/")) {
        Hoster::JwPlayer
    } else if lower.contains(&format!("play.{host}/player1")) {
        Hoster::InternalPlayer
    } else if lower.contains("csst.online") {
        Hoster::AllVideo
    } else if lower.contains("blogger.com") {
        Hoster::Blogger
    } else {
        Hoster::Other
    }
}

/// The media URL rides in the `source` query parameter.
pub fn jwplayer_video(url: &str) -> Option<Video> {
    let parsed = Url::parse(url).ok()?;
    let source = parsed
        .query_pairs()
        .find(|(key, _)| key == "source")
        .map(|(_, value)| value.into_owned())?;
    let host = host_of(&source)?;
    Some(Video::new(&source, format!("Internal Video - {host}"), &source))
}

#[derive(Debug, Deserialize)]
struct PlayerSource {
    file: String,
    label: String,
}

pub fn internal_player_videos(body: &str) -> Vec<Video> {
    let doc = html::parse(body);
    let Some(script) = html::select_all(doc.root_element(), "script")
        .into_iter()
        .map(html::data)
        .find(|data| data.contains("sources"))
    else {
        return Vec::new();
    };
    let Some(array) = script
        .split_once("sources: [")
        .and_then(|(_, rest)| rest.split_once(']'))
        .map(|(inner, _)| format!("[{inner}]"))
    else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<PlayerSource>>(&array) {
        Ok(sources) => sources
            .into_iter()
            .map(|source| {
                Video::new(&source.file, format!("Internal player - {}", source.label), &source.file)
            })
            .collect(),
        Err(err) => {
            debug!(%err, "unreadable internal player sources");
            Vec::new()
        }
    }
}

/// `[label]url` pairs inside the player bootstrap script, first label per URL.
pub fn allvideo_videos(body: &str) -> Vec<Video> {
    let doc = html::parse(body);
    let Some(script) = html::select_all(doc.root_element(), "script")
        .into_iter()
        .map(html::data)
        .find(|data| data.contains("isMobile"))
    else {
        return Vec::new();
    };
    let mut seen: Vec<&str> = Vec::new();
    let mut videos = Vec::new();
    for caps in ALLVIDEO_RE.captures_iter(&script) {
        let (Some(label), Some(url)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let url = url.as_str();
        if seen.contains(&url) {
            continue;
        }
        seen.push(url);
        let mut video = Video::new(url, format!("AllVideo - {}", label.as_str()), url);
        if let Some(host) = host_of(url) {
            video = video.with_header("Referer", format!("https://{host}/"));
        }
        videos.push(video);
    }
    videos
}

/// Blogger embeds list `{"play_url":..,"format_id":..}` stream objects.
pub fn blogger_videos(body: &str) -> Vec<Video> {
    let Some(streams) = body
        .split_once("\"streams\":[")
        .map(|(_, rest)| rest.split_once(']').map_or(rest, |(inner, _)| inner))
    else {
        return Vec::new();
    };
    streams
        .split("},")
        .filter_map(|stream| {
            let url = stream
                .split_once("\"play_url\":\"")
                .and_then(|(_, rest)| rest.split_once('"'))
                .map(|(url, _)| url.replace("\\u003d", "=").replace("\\u0026", "&"))?;
            let format = stream
                .split_once("\"format_id\":")
                .map(|(_, rest)| rest.trim_end_matches('}').trim())
                .unwrap_or_default();
            let quality = match format {
                "18" => "Blogger - 360p",
                "22" => "Blogger - 720p",
                _ => "Unknown Resolution",
            };
            Some(Video::new(&url, quality, &url))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_path_parts() {
        let mut list = filters();
        assert!(list.first_active_uri_part().is_none());
        list.apply_state("year", "2021").unwrap();
        assert_eq!(list.first_active_uri_part(), Some("ano/2021/"));

        let mut list = filters();
        list.apply_state("Letra", "#").unwrap();
        assert_eq!(list.first_active_uri_part(), Some("letra/0-9"));
    }

    #[test]
    fn classifies_hosters_by_site_host() {
        let host = "donghuax.com";
        assert_eq!(
            hoster("https://donghuax.com/jwplayer/?source=https://cdn.example/a.mp4", host),
            Hoster::JwPlayer
        );
        assert_eq!(
            hoster("https://play.donghuax.com/player1/?v=1", host),
            Hoster::InternalPlayer
        );
        assert_eq!(hoster("https://csst.online/embed/77", host), Hoster::AllVideo);
        assert_eq!(
            hoster("https://www.blogger.com/video.g?token=x", host),
            Hoster::Blogger
        );
        assert_eq!(hoster("https://other.example/e/1", host), Hoster::Other);
    }

    #[test]
    fn jwplayer_reads_source_parameter() {
        let video = jwplayer_video(
            "https://donghuax.com/jwplayer/?source=https%3A%2F%2Fcdn.example%2Fep1.mp4&id=2",
        )
        .unwrap();
        assert_eq!(video.video_url, "https://cdn.example/ep1.mp4");
        assert_eq!(video.quality, "Internal Video - cdn.example");
        assert!(jwplayer_video("https://donghuax.com/jwplayer/?id=2").is_none());
    }

    #[test]
    fn internal_player_sources() {
        let body = r#"<script>var player = jwplayer("p").setup({
            sources: [{"file":"https://cdn.example/1080.mp4","label":"1080p"},{"file":"https://cdn.example/720.mp4","label":"720p"}],
            autostart: false });</script>"#;
        let videos = internal_player_videos(body);
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].quality, "Internal player - 1080p");
        assert_eq!(videos[1].video_url, "https://cdn.example/720.mp4");
    }

    #[test]
    fn allvideo_dedupes_and_sets_referer() {
        let body = r#"<script>var isMobile = false; var file = "[720p]https://s1.csstcdn.net/v/720.mp4,[480p]https://s1.csstcdn.net/v/480.mp4,[720p HD]https://s1.csstcdn.net/v/720.mp4";</script>"#;
        let videos = allvideo_videos(body);
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].quality, "AllVideo - 720p");
        assert_eq!(
            videos[0].headers.get("Referer").map(String::as_str),
            Some("https://s1.csstcdn.net/")
        );
    }

    #[test]
    fn blogger_format_ids() {
        let body = r#"var VIDEO_CONFIG = {"streams":[{"play_url":"https://r1.googlevideo.example/a","format_id":18},{"play_url":"https://r1.googlevideo.example/b","format_id":22}]}"#;
        let videos = blogger_videos(body);
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].quality, "Blogger - 360p");
        assert_eq!(videos[1].quality, "Blogger - 720p");
        assert_eq!(videos[1].video_url, "https://r1.googlevideo.example/b");
        assert!(blogger_videos("<html></html>").is_empty());
    }
}
