//! LuciferDonghua, an English AnimeStream site.

use std::sync::Arc;

use crate::providers::SourceContext;
use crate::themes::GenericEmbeds;
use crate::themes::animestream::{AnimeStream, AnimeStreamConfig};

const LUCIFERDONGHUA_BASE_URL: &str = "https://luciferdonghua.in";

pub fn config() -> AnimeStreamConfig {
    AnimeStreamConfig::new("LuciferDonghua", "en", LUCIFERDONGHUA_BASE_URL)
}

pub fn new(ctx: SourceContext) -> AnimeStream {
    AnimeStream::new(config(), ctx, Arc::new(GenericEmbeds))
}
