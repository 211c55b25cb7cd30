use std::sync::LazyLock;

use regex::Regex;

use crate::types::Video;

static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{3,4})\s*p\b").expect("valid regex"));

/// Numeric rank for a quality label: "auto" beats everything, then the
/// vertical resolution, then unknown labels at zero.
pub fn quality_rank(label: &str) -> i32 {
    if label.trim().eq_ignore_ascii_case("auto") {
        return 10_000;
    }
    if let Some(caps) = RESOLUTION_RE.captures(label) {
        return caps[1].parse().unwrap_or(0);
    }
    label.trim().trim_end_matches('p').parse::<i32>().unwrap_or(0)
}

/// Preferred quality first, then highest resolution. Stable for ties.
pub fn sort_videos(videos: &mut [Video], preferred: Option<&str>) {
    let preferred = preferred.map(str::to_lowercase);
    videos.sort_by_key(|video| {
        let is_preferred = preferred
            .as_deref()
            .is_some_and(|p| video.quality.to_lowercase().contains(p));
        (std::cmp::Reverse(is_preferred), std::cmp::Reverse(quality_rank(&video.quality)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(quality: &str) -> Video {
        Video::new("", quality, format!("https://cdn/{quality}"))
    }

    #[test]
    fn ranks_labels() {
        assert_eq!(quality_rank("auto"), 10_000);
        assert_eq!(quality_rank("Mirror 2 - 720p"), 720);
        assert_eq!(quality_rank("1080"), 1080);
        assert_eq!(quality_rank("HD"), 0);
    }

    #[test]
    fn preferred_quality_comes_first() {
        let mut videos = vec![video("480p"), video("1080p"), video("720p")];
        sort_videos(&mut videos, Some("720P"));
        let order: Vec<_> = videos.iter().map(|v| v.quality.as_str()).collect();
        assert_eq!(order, vec!["720p", "1080p", "480p"]);
    }

    #[test]
    fn without_preference_sorts_by_resolution() {
        let mut videos = vec![video("360p"), video("HD"), video("1080p")];
        sort_videos(&mut videos, None);
        assert_eq!(videos[0].quality, "1080p");
        assert_eq!(videos[2].quality, "HD");
    }
}
