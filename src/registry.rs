//! Every adapter the crate ships, built once over a shared HTTP client.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;
use crate::providers::allanime::{AllAnime, AllManga};
use crate::providers::mangadex::MangaDex;
use crate::providers::mangapill::Mangapill;
use crate::providers::tenshimoe::TenshiMoe;
use crate::providers::{
    AnimeSource, MangaSource, SourceContext, SourceInfo, asurascans, donghuax, guya,
    luciferdonghua,
};

/// A registered adapter of either kind.
#[derive(Clone)]
pub enum AnySource {
    Anime(Arc<dyn AnimeSource>),
    Manga(Arc<dyn MangaSource>),
}

impl AnySource {
    pub fn info(&self) -> &SourceInfo {
        match self {
            AnySource::Anime(source) => source.info(),
            AnySource::Manga(source) => source.info(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnySource::Anime(_) => "anime",
            AnySource::Manga(_) => "manga",
        }
    }
}

pub struct SourceRegistry {
    anime: Vec<Arc<dyn AnimeSource>>,
    manga: Vec<Arc<dyn MangaSource>>,
}

impl SourceRegistry {
    pub fn new(settings: &Settings) -> Result<Self> {
        let ctx = SourceContext::new(settings.clone())?;
        let anime: Vec<Arc<dyn AnimeSource>> = vec![
            Arc::new(AllAnime::new(ctx.clone())),
            Arc::new(TenshiMoe::new(ctx.clone())),
            Arc::new(donghuax::new(ctx.clone())),
            Arc::new(luciferdonghua::new(ctx.clone())),
        ];
        let manga: Vec<Arc<dyn MangaSource>> = vec![
            Arc::new(AllManga::new(ctx.clone())),
            Arc::new(MangaDex::new(ctx.clone())),
            Arc::new(Mangapill::new(ctx.clone())),
            Arc::new(asurascans::new(ctx.clone())),
            Arc::new(guya::new(ctx)),
        ];
        Ok(Self { anime, manga })
    }

    pub fn anime(&self) -> &[Arc<dyn AnimeSource>] {
        &self.anime
    }

    pub fn manga(&self) -> &[Arc<dyn MangaSource>] {
        &self.manga
    }

    /// Anime sources first, then manga, in registration order.
    pub fn all(&self) -> Vec<AnySource> {
        self.anime
            .iter()
            .cloned()
            .map(AnySource::Anime)
            .chain(self.manga.iter().cloned().map(AnySource::Manga))
            .collect()
    }

    pub fn anime_by_name(&self, name: &str) -> Option<Arc<dyn AnimeSource>> {
        self.anime
            .iter()
            .find(|source| same_name(&source.info().name, name))
            .cloned()
    }

    pub fn manga_by_name(&self, name: &str) -> Option<Arc<dyn MangaSource>> {
        self.manga
            .iter()
            .find(|source| same_name(&source.info().name, name))
            .cloned()
    }

    /// Looks up a source of either kind by name.
    pub fn by_name(&self, name: &str) -> Option<AnySource> {
        self.anime_by_name(name)
            .map(AnySource::Anime)
            .or_else(|| self.manga_by_name(name).map(AnySource::Manga))
    }

    pub fn by_id(&self, id: u64) -> Option<AnySource> {
        self.all().into_iter().find(|source| source.info().id == id)
    }
}

/// Case-insensitive, ignoring spaces: "allanime" finds "AllAnime" and
/// "asurascans" finds "Asura Scans".
fn same_name(registered: &str, wanted: &str) -> bool {
    let normalize = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    normalize(registered).eq_ignore_ascii_case(&normalize(wanted))
}
