//! Adapters shared by every site running the same CMS theme.
//!
//! A theme is a plain struct built from a per-site config; everything a site
//! changes is a config field, and hoster lookups go through [`EmbedResolver`].

use async_trait::async_trait;

use crate::error::Result;
use crate::extractors;
use crate::http::HttpClient;
use crate::types::Video;

pub mod animestream;
pub mod dooplay;
pub mod guya;
pub mod wpmangareader;

/// Prefix accepted by `search` to open one series by its site path.
pub const PATH_PREFIX: &str = "path:";
/// Prefix accepted by WPMangaReader `search` to open one series by full URL.
pub const URL_PREFIX: &str = "url:";
/// Prefix accepted by Guya `search` to open one series by slug.
pub const SLUG_PREFIX: &str = "slug:";

/// A hoster page found on an episode page, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub url: String,
    /// Mirror name as shown on the site.
    pub label: String,
    pub referer: String,
}

#[async_trait]
pub trait EmbedResolver: Send + Sync {
    async fn resolve(&self, http: &HttpClient, embed: &Embed) -> Result<Vec<Video>>;
}

/// Fetches the embed once and scrapes whatever player it hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericEmbeds;

#[async_trait]
impl EmbedResolver for GenericEmbeds {
    async fn resolve(&self, http: &HttpClient, embed: &Embed) -> Result<Vec<Video>> {
        extractors::resolve_embed(http, &embed.url, &embed.label, Some(&embed.referer)).await
    }
}

/// Joins a stored relative URL back onto `base`.
pub fn absolute(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{base}{url}")
    } else {
        format!("{base}/{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_keeps_full_urls() {
        let base = "https://site.example";
        assert_eq!(absolute(base, "/anime/x/"), "https://site.example/anime/x/");
        assert_eq!(absolute(base, "anime/x/"), "https://site.example/anime/x/");
        assert_eq!(absolute(base, "https://cdn.example/x"), "https://cdn.example/x");
    }
}
