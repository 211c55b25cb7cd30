//! Scrapes media links out of third-party player pages.
//!
//! Covers the player setups hosters reuse most: plain `<source>` tags,
//! JW Player / video.js style `{file: "...", label: "..."}` objects inside
//! scripts, and bare HLS links as a last resort.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::html;
use crate::types::{Track, Video};

static SCRIPT_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("valid regex"));
static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:file|src)\s*:\s*["']([^"']+)["']"#).expect("valid regex")
});
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:label|size|res)\s*:\s*["']?([^"',}]+?)["']?\s*(?:,|$)"#).expect("valid regex")
});
static KIND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"kind\s*:\s*["'](captions|subtitles)["']"#).expect("valid regex")
});
static HLS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^"'\s\\]+\.m3u8[^"'\s\\]*"#).expect("valid regex")
});

const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".m3u8", ".webm", ".mkv"];
const SUBTITLE_EXTENSIONS: &[&str] = &[".vtt", ".srt", ".ass"];

pub fn is_direct_media(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Every video a player page exposes, each labelled `"{label} - {quality}"`.
pub fn videos_from_player(body: &str, page_url: &str, label: &str) -> Vec<Video> {
    let doc = html::parse(body);
    let root = doc.root_element();
    let mut videos: Vec<Video> = Vec::new();
    let mut subtitles: Vec<Track> = Vec::new();

    for source in html::select_all(root, "video source[src], source[src]") {
        let Some(src) = html::abs_attr(source, "src", page_url) else {
            continue;
        };
        let quality = html::attr(source, "label")
            .or_else(|| html::attr(source, "size"))
            .or_else(|| html::attr(source, "res"))
            .map(quality_label)
            .unwrap_or_default();
        push_unique(&mut videos, Video::new(page_url, join_label(label, &quality), src));
    }

    for track in html::select_all(root, "track[src]") {
        if let Some(src) = html::abs_attr(track, "src", page_url) {
            let lang = html::attr(track, "label")
                .or_else(|| html::attr(track, "srclang"))
                .unwrap_or("Unknown");
            subtitles.push(Track {
                url: src,
                lang: lang.to_string(),
            });
        }
    }

    for script in html::select_all(root, "script") {
        let code = html::data(script);
        for object in SCRIPT_OBJECT_RE.captures_iter(&code) {
            let body = &object[1];
            let Some(file) = FILE_RE.captures(body).map(|c| c[1].to_string()) else {
                continue;
            };
            let Some(file) = html::abs_url(page_url, &file.replace("\\/", "/")) else {
                continue;
            };
            let raw_label = LABEL_RE
                .captures(body)
                .map(|c| c[1].trim().to_string())
                .unwrap_or_default();
            let lower = file.to_ascii_lowercase();
            if KIND_RE.is_match(body) || SUBTITLE_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
                subtitles.push(Track {
                    url: file,
                    lang: if raw_label.is_empty() { "Unknown".to_string() } else { raw_label },
                });
                continue;
            }
            if !looks_like_media(&lower) {
                continue;
            }
            let quality = quality_label(&raw_label);
            push_unique(&mut videos, Video::new(page_url, join_label(label, &quality), file));
        }
    }

    if videos.is_empty() {
        for found in HLS_RE.find_iter(body) {
            push_unique(&mut videos, Video::new(page_url, label, found.as_str()));
        }
    }

    for video in &mut videos {
        video.subtitles = subtitles.clone();
    }
    videos
}

/// `"720"` -> `"720p"`; other labels pass through.
pub fn quality_label(raw: &str) -> String {
    let raw = raw.trim();
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{raw}p")
    } else {
        raw.to_string()
    }
}

fn join_label(label: &str, quality: &str) -> String {
    match (label.is_empty(), quality.is_empty()) {
        (_, true) => label.to_string(),
        (true, false) => quality.to_string(),
        (false, false) => format!("{label} - {quality}"),
    }
}

fn looks_like_media(lower: &str) -> bool {
    if !lower.starts_with("http") {
        return false;
    }
    let image = [".jpg", ".jpeg", ".png", ".webp", ".gif", ".js", ".css"]
        .iter()
        .any(|ext| lower.ends_with(ext));
    !image
}

fn push_unique(videos: &mut Vec<Video>, video: Video) {
    if !videos.iter().any(|v| v.video_url == video.video_url) {
        videos.push(video);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://player.example.net/embed/abc";

    #[test]
    fn reads_source_tags_and_tracks() {
        let body = r#"<video>
            <source src="/media/abc-720.mp4" size="720">
            <source src="https://cdn.example.net/abc-480.mp4" label="480p">
            <track src="/subs/en.vtt" label="English" kind="captions">
        </video>"#;
        let videos = videos_from_player(body, PAGE, "Mirror");
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].quality, "Mirror - 720p");
        assert_eq!(videos[0].video_url, "https://player.example.net/media/abc-720.mp4");
        assert_eq!(videos[1].quality, "Mirror - 480p");
        assert_eq!(videos[0].subtitles[0].lang, "English");
    }

    #[test]
    fn reads_jwplayer_setup() {
        let body = r#"<script>
            jwplayer("v").setup({
              sources: [{file: "https:\/\/cdn.example.net\/hls\/master.m3u8", label: "1080"},
                        {file: "https://cdn.example.net/low.mp4", label: "360"}],
              tracks: [{file: "https://cdn.example.net/en.vtt", label: "English", kind: "captions"},
                       {file: "https://cdn.example.net/thumbs.jpg", kind: "thumbnails"}]
            });
        </script>"#;
        let videos = videos_from_player(body, PAGE, "JW");
        let qualities: Vec<_> = videos.iter().map(|v| v.quality.as_str()).collect();
        assert_eq!(qualities, vec!["JW - 1080p", "JW - 360p"]);
        assert_eq!(videos[0].video_url, "https://cdn.example.net/hls/master.m3u8");
        assert_eq!(videos[0].subtitles.len(), 1);
    }

    #[test]
    fn reads_videojs_sizes() {
        let body = r#"<script>
            const player = new Plyr('#player', {});
            player.source = { type: 'video', sources: [
              { src: 'https://media.example.net/ep1-1080.mp4', type: 'video/mp4', size: 1080, },
              { src: 'https://media.example.net/ep1-720.mp4', type: 'video/mp4', size: 720, },
            ], };
        </script>"#;
        let videos = videos_from_player(body, PAGE, "");
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].quality, "1080p");
        assert_eq!(videos[1].quality, "720p");
    }

    #[test]
    fn label_keys_match_whole_words() {
        let body = r#"<script>
            player.setup({sources: [{file: "https://cdn.example.net/a.mp4", presize: 99, resolution: "4k"},
                                    {file: "https://cdn.example.net/b.mp4", res: 480}]});
        </script>"#;
        let videos = videos_from_player(body, PAGE, "Mirror");
        let qualities: Vec<_> = videos.iter().map(|v| v.quality.as_str()).collect();
        assert_eq!(qualities, vec!["Mirror", "Mirror - 480p"]);
    }

    #[test]
    fn falls_back_to_bare_hls_links() {
        let body = r#"<script>var u = "https://edge.example.net/a/index.m3u8?t=1";</script>"#;
        let videos = videos_from_player(body, PAGE, "Edge");
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].video_url, "https://edge.example.net/a/index.m3u8?t=1");
    }

    #[test]
    fn detects_direct_media() {
        assert!(is_direct_media("https://cdn.example.net/v/ep.mp4?token=1"));
        assert!(!is_direct_media("https://player.example.net/embed/abc"));
    }
}
