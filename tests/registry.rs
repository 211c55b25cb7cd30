use std::collections::HashSet;

use mediasrc::config::Settings;
use mediasrc::{AnySource, SourceRegistry};

fn registry() -> SourceRegistry {
    SourceRegistry::new(&Settings::default()).unwrap()
}

#[test]
fn names_are_unique_ignoring_case() {
    let registry = registry();
    let mut seen = HashSet::new();
    for source in registry.all() {
        let name = source.info().name.to_lowercase().replace(' ', "");
        assert!(seen.insert(name.clone()), "duplicate source name {name}");
    }
    assert_eq!(seen.len(), registry.anime().len() + registry.manga().len());
}

#[test]
fn ids_are_unique_and_resolve_back() {
    let registry = registry();
    let ids: HashSet<u64> = registry.all().iter().map(|s| s.info().id).collect();
    assert_eq!(ids.len(), registry.all().len());
    for id in ids {
        let source = registry.by_id(id).unwrap();
        assert_eq!(source.info().id, id);
    }
    assert!(registry.by_id(0).is_none());
}

#[test]
fn ids_survive_a_rebuild() {
    let first: Vec<u64> = registry().all().iter().map(|s| s.info().id).collect();
    let second: Vec<u64> = registry().all().iter().map(|s| s.info().id).collect();
    assert_eq!(first, second);
}

#[test]
fn lookups_respect_kind() {
    let registry = registry();
    assert!(registry.anime_by_name("allanime").is_some());
    assert!(registry.manga_by_name("allanime").is_none());
    assert!(registry.manga_by_name("ALLMANGA").is_some());
    assert!(registry.manga_by_name("asura scans").is_some());
    assert!(matches!(registry.by_name("donghuax"), Some(AnySource::Anime(_))));
    assert!(matches!(registry.by_name("MangaDex"), Some(AnySource::Manga(_))));
    assert!(registry.by_name("nope").is_none());
}

#[test]
fn base_url_override_reaches_the_source() {
    let mut settings = Settings::default();
    settings.sources.insert(
        "mangapill".to_string(),
        mediasrc::config::SourcePrefs {
            base_url: Some("https://mirror.example/".to_string()),
            ..Default::default()
        },
    );
    let registry = SourceRegistry::new(&settings).unwrap();
    let source = registry.manga_by_name("mangapill").unwrap();
    assert_eq!(source.info().base_url, "https://mirror.example");
}

#[test]
fn latest_support_matches_the_sites() {
    let registry = registry();
    let supports = |name: &str| registry.by_name(name).unwrap().info().supports_latest;
    assert!(supports("DonghuaX"));
    assert!(supports("MangaDex"));
    assert!(!supports("Mangapill"));
    assert!(!supports("Guya"));
}
