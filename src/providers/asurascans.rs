//! Asura Scans, an English WPMangaReader site.

use crate::providers::SourceContext;
use crate::themes::wpmangareader::{WpMangaReader, WpMangaReaderConfig};

const ASURASCANS_BASE_URL: &str = "https://asuracomics.com";

pub fn config() -> WpMangaReaderConfig {
    WpMangaReaderConfig {
        date_formats: &["%B %d, %Y", "%b %d, %Y"],
        ..WpMangaReaderConfig::new("Asura Scans", "en", ASURASCANS_BASE_URL)
    }
}

pub fn new(ctx: SourceContext) -> WpMangaReader {
    WpMangaReader::new(config(), ctx)
}
