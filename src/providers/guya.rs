//! Guya.moe, the reference Guya reader.

use crate::providers::SourceContext;
use crate::themes::guya::{Guya, GuyaConfig};

const GUYA_BASE_URL: &str = "https://guya.moe";

pub fn new(ctx: SourceContext) -> Guya {
    Guya::new(
        GuyaConfig {
            name: "Guya",
            lang: "en",
            base_url: GUYA_BASE_URL,
        },
        ctx,
    )
}
