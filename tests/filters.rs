use mediasrc::config::Settings;
use mediasrc::filters::{Filter, FilterList};
use mediasrc::SourceRegistry;

fn filters_of(name: &str) -> FilterList {
    let registry = SourceRegistry::new(&Settings::default()).unwrap();
    match registry.by_name(name).unwrap() {
        mediasrc::AnySource::Anime(source) => source.filters(),
        mediasrc::AnySource::Manga(source) => source.filters(),
    }
}

#[test]
fn mangadex_defaults_to_follow_order() {
    let list = filters_of("mangadex");
    assert_eq!(
        list.query_pairs(),
        vec![("order[followedCount]".to_string(), "desc".to_string())]
    );
}

#[test]
fn mangadex_applies_named_filters() {
    let mut list = filters_of("mangadex");
    list.apply_state("Sort", "title:asc").unwrap();
    list.apply_state("status[]", "ongoing, hiatus").unwrap();
    list.apply_state("Demographic", "Seinen").unwrap();
    assert_eq!(
        list.query_pairs(),
        vec![
            ("order[title]".to_string(), "asc".to_string()),
            ("status[]".to_string(), "ongoing".to_string()),
            ("status[]".to_string(), "hiatus".to_string()),
            ("publicationDemographic[]".to_string(), "seinen".to_string()),
        ]
    );
}

#[test]
fn unknown_filters_and_options_are_errors() {
    let mut list = filters_of("mangadex");
    assert!(list.apply_state("nope", "x").is_err());
    assert!(list.apply_state("Status", "flying").is_err());
}

#[test]
fn fixed_path_filters_need_no_listing() {
    let mut list = filters_of("DonghuaX");
    assert!(matches!(list.iter().next(), Some(Filter::Header { .. })));
    list.apply_state("Gêneros", "Drama").unwrap();
    assert_eq!(list.first_active_uri_part(), Some("genero/drama/"));
    assert!(list.query_pairs().iter().any(|(k, v)| k == "genre" && v == "genero/drama/"));
}

#[test]
fn scraped_genres_wait_for_a_listing() {
    let list = filters_of("Asura Scans");
    assert!(list.checkbox_group("genre[]").is_none());
    assert!(list.select("order").is_some());
}

#[test]
fn filter_lists_serialize_for_the_cli() {
    let list = filters_of("mangapill");
    let json = serde_json::to_value(&list).unwrap();
    let first = &json[0];
    assert_eq!(first["type"], "select");
    assert_eq!(first["key"], "type");
}
