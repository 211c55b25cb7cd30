use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Settings, SourcePrefs};
use crate::error::{Result, SourceError};
use crate::filters::FilterList;
use crate::http::HttpClient;
use crate::types::{Chapter, Episode, Page, Series, SeriesPage, Video};

pub mod allanime;
pub mod asurascans;
pub mod donghuax;
pub mod guya;
pub mod luciferdonghua;
pub mod mangadex;
pub mod mangapill;
pub mod tenshimoe;

/// Static description of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub id: u64,
    pub name: String,
    pub lang: String,
    pub base_url: String,
    pub supports_latest: bool,
}

impl SourceInfo {
    pub fn new(name: &str, lang: &str, base_url: &str, supports_latest: bool) -> Self {
        Self::versioned(name, lang, base_url, supports_latest, 1)
    }

    /// Bumping `version` yields a new id, for sites whose URLs changed incompatibly.
    pub fn versioned(
        name: &str,
        lang: &str,
        base_url: &str,
        supports_latest: bool,
        version: u32,
    ) -> Self {
        Self {
            id: source_id(name, lang, version),
            name: name.to_string(),
            lang: lang.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            supports_latest,
        }
    }
}

/// FNV-1a over `"{name}/{lang}/{version}"` with the sign bit cleared so the id
/// also fits a signed 64-bit column.
pub fn source_id(name: &str, lang: &str, version: u32) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let key = format!("{}/{}/{}", name.to_lowercase(), lang, version);
    let hash = key
        .bytes()
        .fold(OFFSET, |acc, b| (acc ^ u64::from(b)).wrapping_mul(PRIME));
    hash & (u64::MAX >> 1)
}

/// What every source is built from.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub http: HttpClient,
    pub settings: Arc<Settings>,
}

impl SourceContext {
    pub fn new(settings: Settings) -> Result<Self> {
        let http = HttpClient::new(&settings)?;
        Ok(Self {
            http,
            settings: Arc::new(settings),
        })
    }

    pub fn prefs(&self, source_name: &str) -> SourcePrefs {
        self.settings.source(source_name)
    }

    /// Configured base URL override, else `default`.
    pub fn base_url(&self, source_name: &str, default: &str) -> String {
        self.prefs(source_name)
            .base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn concurrency(&self) -> usize {
        self.settings.concurrency.max(1)
    }
}

#[async_trait]
pub trait AnimeSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    async fn popular(&self, page: u32) -> Result<SeriesPage>;

    async fn latest(&self, _page: u32) -> Result<SeriesPage> {
        Err(SourceError::Unsupported("latest updates"))
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage>;

    async fn details(&self, series: &Series) -> Result<Series>;

    async fn episodes(&self, series: &Series) -> Result<Vec<Episode>>;

    async fn videos(&self, episode: &Episode) -> Result<Vec<Video>>;

    fn filters(&self) -> FilterList {
        FilterList::empty()
    }

    /// Loads filter options that come from the site itself, such as a
    /// scraped genre menu. Sources with fixed filters do nothing.
    async fn refresh_filters(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait MangaSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    async fn popular(&self, page: u32) -> Result<SeriesPage>;

    async fn latest(&self, _page: u32) -> Result<SeriesPage> {
        Err(SourceError::Unsupported("latest updates"))
    }

    async fn search(&self, page: u32, query: &str, filters: &FilterList) -> Result<SeriesPage>;

    async fn details(&self, series: &Series) -> Result<Series>;

    async fn chapters(&self, series: &Series) -> Result<Vec<Chapter>>;

    async fn pages(&self, chapter: &Chapter) -> Result<Vec<Page>>;

    /// Resolves a reader page to its image. Most sources hand out image URLs
    /// directly, so the default just returns them.
    async fn image_url(&self, page: &Page) -> Result<String> {
        page.image_url
            .clone()
            .ok_or(SourceError::Unsupported("image url resolution"))
    }

    fn filters(&self) -> FilterList {
        FilterList::empty()
    }

    /// Loads filter options that come from the site itself, such as a
    /// scraped genre menu. Sources with fixed filters do nothing.
    async fn refresh_filters(&self) -> Result<()> {
        Ok(())
    }
}
