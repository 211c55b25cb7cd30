use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::http::HttpClient;
use crate::types::Video;

pub mod generic;

/// Resolves one hoster embed into playable videos.
///
/// Direct media links are returned as-is; anything else is fetched once and
/// scraped with [`generic::videos_from_player`]. Scraped videos carry a
/// `Referer` of the hoster origin unless the page already set one.
pub async fn resolve_embed(
    http: &HttpClient,
    url: &str,
    label: &str,
    referer: Option<&str>,
) -> Result<Vec<Video>> {
    if generic::is_direct_media(url) {
        let mut video = Video::new(url, label, url);
        if let Some(referer) = referer {
            video = video.with_header("Referer", referer);
        }
        return Ok(vec![video]);
    }

    debug!(%url, %label, "resolving embed");
    let mut request = http.get(url);
    if let Some(referer) = referer {
        request = request.header("Referer", referer);
    }
    let page = http.fetch(request).await?;
    let origin = origin_of(&page.url).unwrap_or_else(|| page.url.clone());

    let mut videos = generic::videos_from_player(&page.body, &page.url, label);
    for video in &mut videos {
        video
            .headers
            .entry("Referer".to_string())
            .or_insert_with(|| origin.clone());
    }
    Ok(videos)
}

/// `https://host[:port]/` of a URL.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}/", parsed.scheme()),
        None => format!("{}://{host}/", parsed.scheme()),
    })
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}
