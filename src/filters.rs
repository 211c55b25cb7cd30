//! Search refinements a source declares and the caller fills in.
//!
//! A [`FilterList`] is handed out by `filters()`, mutated by the caller, then
//! passed back to `search()`, where the source turns the selected state into
//! query parameters or path segments.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SourceError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterOption {
    pub label: String,
    pub value: String,
}

impl FilterOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Builds options from `(label, value)` pairs.
pub fn options(pairs: &[(&str, &str)]) -> Vec<FilterOption> {
    pairs
        .iter()
        .map(|(label, value)| FilterOption::new(*label, *value))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Select {
    pub key: String,
    pub name: String,
    pub options: Vec<FilterOption>,
    pub state: usize,
}

impl Select {
    pub fn new(key: &str, name: &str, options: Vec<FilterOption>) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            options,
            state: 0,
        }
    }

    pub fn selected(&self) -> Option<&FilterOption> {
        self.options.get(self.state)
    }

    /// The selected value, used directly as a URL path part by path-routed themes.
    pub fn uri_part(&self) -> &str {
        self.selected().map(|o| o.value.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckBox {
    pub label: String,
    pub value: String,
    pub state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckBoxGroup {
    pub key: String,
    pub name: String,
    pub options: Vec<CheckBox>,
}

impl CheckBoxGroup {
    pub fn new(key: &str, name: &str, options: Vec<FilterOption>) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            options: options
                .into_iter()
                .map(|o| CheckBox {
                    label: o.label,
                    value: o.value,
                    state: false,
                })
                .collect(),
        }
    }

    pub fn checked(&self) -> impl Iterator<Item = &str> {
        self.options
            .iter()
            .filter(|o| o.state)
            .map(|o| o.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriStateValue {
    #[default]
    Ignore,
    Include,
    Exclude,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriState {
    pub label: String,
    pub value: String,
    pub state: TriStateValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriStateGroup {
    pub key: String,
    pub name: String,
    pub options: Vec<TriState>,
}

impl TriStateGroup {
    pub fn new(key: &str, name: &str, options: Vec<FilterOption>) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            options: options
                .into_iter()
                .map(|o| TriState {
                    label: o.label,
                    value: o.value,
                    state: TriStateValue::Ignore,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextFilter {
    pub key: String,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortSelection {
    pub index: usize,
    pub ascending: bool,
}

/// A sort order. When `key` contains `{}` the selected value is substituted
/// into the key and the direction becomes the value (`order[{}]` ->
/// `order[title]=asc`); otherwise the value is sent under `key` as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortFilter {
    pub key: String,
    pub name: String,
    pub options: Vec<FilterOption>,
    pub selection: Option<SortSelection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Header { text: String },
    Separator,
    Select(Select),
    CheckBoxGroup(CheckBoxGroup),
    TriStateGroup(TriStateGroup),
    Text(TextFilter),
    Sort(SortFilter),
}

impl Filter {
    pub fn header(text: impl Into<String>) -> Self {
        Filter::Header { text: text.into() }
    }

    pub fn text(key: &str, name: &str) -> Self {
        Filter::Text(TextFilter {
            key: key.to_string(),
            name: name.to_string(),
            state: String::new(),
        })
    }

    pub fn sort(key: &str, name: &str, options: Vec<FilterOption>, default: Option<SortSelection>) -> Self {
        Filter::Sort(SortFilter {
            key: key.to_string(),
            name: name.to_string(),
            options,
            selection: default,
        })
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Filter::Header { .. } | Filter::Separator => None,
            Filter::Select(f) => Some(&f.name),
            Filter::CheckBoxGroup(f) => Some(&f.name),
            Filter::TriStateGroup(f) => Some(&f.name),
            Filter::Text(f) => Some(&f.name),
            Filter::Sort(f) => Some(&f.name),
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Filter::Header { .. } | Filter::Separator => None,
            Filter::Select(f) => Some(&f.key),
            Filter::CheckBoxGroup(f) => Some(&f.key),
            Filter::TriStateGroup(f) => Some(&f.key),
            Filter::Text(f) => Some(&f.key),
            Filter::Sort(f) => Some(&f.key),
        }
    }

    /// Whether the caller changed this filter from its resting state.
    pub fn is_active(&self) -> bool {
        match self {
            Filter::Header { .. } | Filter::Separator => false,
            Filter::Select(f) => f.state != 0,
            Filter::CheckBoxGroup(f) => f.options.iter().any(|o| o.state),
            Filter::TriStateGroup(f) => f.options.iter().any(|o| o.state != TriStateValue::Ignore),
            Filter::Text(f) => !f.state.trim().is_empty(),
            Filter::Sort(f) => f.selection.is_some(),
        }
    }

    fn push_pairs(&self, out: &mut Vec<(String, String)>) {
        match self {
            Filter::Header { .. } | Filter::Separator => {}
            Filter::Select(f) => {
                let value = f.uri_part();
                if !value.is_empty() {
                    out.push((f.key.clone(), value.to_string()));
                }
            }
            Filter::CheckBoxGroup(f) => {
                out.extend(f.checked().map(|v| (f.key.clone(), v.to_string())));
            }
            Filter::TriStateGroup(f) => {
                for option in &f.options {
                    match option.state {
                        TriStateValue::Ignore => {}
                        TriStateValue::Include => out.push((f.key.clone(), option.value.clone())),
                        TriStateValue::Exclude => {
                            out.push((f.key.clone(), format!("-{}", option.value)))
                        }
                    }
                }
            }
            Filter::Text(f) => {
                let value = f.state.trim();
                if !value.is_empty() {
                    out.push((f.key.clone(), value.to_string()));
                }
            }
            Filter::Sort(f) => {
                let Some(selection) = f.selection else {
                    return;
                };
                let Some(option) = f.options.get(selection.index) else {
                    return;
                };
                if f.key.contains("{}") {
                    let direction = if selection.ascending { "asc" } else { "desc" };
                    out.push((f.key.replace("{}", &option.value), direction.to_string()));
                } else if !option.value.is_empty() {
                    out.push((f.key.clone(), option.value.clone()));
                }
            }
        }
    }

    fn apply(&mut self, raw: &str) -> Result<()> {
        match self {
            Filter::Header { .. } | Filter::Separator => {
                Err(SourceError::parse("headers and separators take no value"))
            }
            Filter::Select(f) => {
                f.state = find_option(&f.options, raw)
                    .ok_or_else(|| unknown_option(&f.name, raw))?;
                Ok(())
            }
            Filter::CheckBoxGroup(f) => {
                for wanted in split_list(raw) {
                    let option = f
                        .options
                        .iter_mut()
                        .find(|o| matches_option(&o.label, &o.value, wanted))
                        .ok_or_else(|| unknown_option(&f.name, wanted))?;
                    option.state = true;
                }
                Ok(())
            }
            Filter::TriStateGroup(f) => {
                for wanted in split_list(raw) {
                    let (state, wanted) = match wanted.strip_prefix('-') {
                        Some(rest) => (TriStateValue::Exclude, rest),
                        None => (TriStateValue::Include, wanted),
                    };
                    let option = f
                        .options
                        .iter_mut()
                        .find(|o| matches_option(&o.label, &o.value, wanted))
                        .ok_or_else(|| unknown_option(&f.name, wanted))?;
                    option.state = state;
                }
                Ok(())
            }
            Filter::Text(f) => {
                f.state = raw.to_string();
                Ok(())
            }
            Filter::Sort(f) => {
                let (wanted, ascending) = match raw.rsplit_once(':') {
                    Some((value, dir)) if dir.eq_ignore_ascii_case("asc") => (value, true),
                    Some((value, dir)) if dir.eq_ignore_ascii_case("desc") => (value, false),
                    _ => (raw, false),
                };
                let index = find_option(&f.options, wanted)
                    .ok_or_else(|| unknown_option(&f.name, wanted))?;
                f.selection = Some(SortSelection { index, ascending });
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterList(pub Vec<Filter>);

impl FilterList {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self(filters)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Query parameters for every active filter, in declaration order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for filter in &self.0 {
            filter.push_pairs(&mut out);
        }
        out
    }

    pub fn select(&self, key: &str) -> Option<&Select> {
        self.0.iter().find_map(|f| match f {
            Filter::Select(s) if s.key == key => Some(s),
            _ => None,
        })
    }

    pub fn checkbox_group(&self, key: &str) -> Option<&CheckBoxGroup> {
        self.0.iter().find_map(|f| match f {
            Filter::CheckBoxGroup(g) if g.key == key => Some(g),
            _ => None,
        })
    }

    /// The path part of the first select the caller moved off its default.
    pub fn first_active_uri_part(&self) -> Option<&str> {
        self.0.iter().find_map(|f| match f {
            Filter::Select(s) if s.state != 0 => Some(s.uri_part()),
            _ => None,
        })
    }

    /// Sets state from a textual `value`, addressing the filter by key or
    /// display name. Lists are comma separated; `-x` excludes in tri-state
    /// groups; sorts take `value[:asc|:desc]`.
    pub fn apply_state(&mut self, filter: &str, value: &str) -> Result<()> {
        let target = self
            .0
            .iter_mut()
            .find(|f| {
                f.key().is_some_and(|k| k.eq_ignore_ascii_case(filter))
                    || f.name().is_some_and(|n| n.eq_ignore_ascii_case(filter))
            })
            .ok_or_else(|| SourceError::parse(format!("unknown filter `{filter}`")))?;
        target.apply(value.trim())
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn matches_option(label: &str, value: &str, wanted: &str) -> bool {
    label.eq_ignore_ascii_case(wanted) || value.eq_ignore_ascii_case(wanted)
}

fn find_option(options: &[FilterOption], wanted: &str) -> Option<usize> {
    options
        .iter()
        .position(|o| matches_option(&o.label, &o.value, wanted))
        .or_else(|| wanted.parse::<usize>().ok().filter(|i| *i < options.len()))
}

fn unknown_option(filter: &str, wanted: &str) -> SourceError {
    SourceError::parse(format!("`{wanted}` is not an option of `{filter}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FilterList {
        FilterList::new(vec![
            Filter::header("Ignored with text search"),
            Filter::CheckBoxGroup(CheckBoxGroup::new(
                "genre[]",
                "Genre",
                options(&[("Action", "action"), ("Drama", "drama"), ("Isekai", "isekai")]),
            )),
            Filter::Select(Select::new(
                "status",
                "Status",
                options(&[("All", ""), ("Ongoing", "ongoing"), ("Completed", "completed")]),
            )),
            Filter::TriStateGroup(TriStateGroup::new(
                "tags",
                "Tags",
                options(&[("Gore", "gore"), ("Comedy", "comedy")]),
            )),
            Filter::text("author", "Author"),
            Filter::sort("order[{}]", "Sort", options(&[("Title", "title"), ("Year", "year")]), None),
        ])
    }

    #[test]
    fn untouched_filters_emit_nothing() {
        assert!(sample().query_pairs().is_empty());
    }

    #[test]
    fn selected_state_becomes_query_pairs() {
        let mut filters = sample();
        filters.apply_state("genre", "Action, isekai").unwrap();
        filters.apply_state("status", "completed").unwrap();
        filters.apply_state("tags", "comedy,-gore").unwrap();
        filters.apply_state("author", " Oda ").unwrap();
        filters.apply_state("sort", "year:asc").unwrap();

        let pairs: Vec<(String, String)> = filters.query_pairs();
        let expected: Vec<(String, String)> = [
            ("genre[]", "action"),
            ("genre[]", "isekai"),
            ("status", "completed"),
            ("tags", "-gore"),
            ("tags", "comedy"),
            ("author", "Oda"),
            ("order[year]", "asc"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn plain_sort_key_sends_value() {
        let mut filters = FilterList::new(vec![Filter::sort(
            "order",
            "Order by",
            options(&[("Popular", "popular"), ("Update", "update")]),
            None,
        )]);
        filters.apply_state("order", "update").unwrap();
        assert_eq!(
            filters.query_pairs(),
            vec![("order".to_string(), "update".to_string())]
        );
    }

    #[test]
    fn first_active_uri_part_skips_defaults() {
        let mut filters = FilterList::new(vec![
            Filter::Select(Select::new("", "Genre", options(&[("<Select>", ""), ("Action", "genre/action")]))),
            Filter::Select(Select::new("", "Year", options(&[("<Select>", ""), ("2020", "release/2020")]))),
        ]);
        assert_eq!(filters.first_active_uri_part(), None);
        filters.apply_state("Year", "2020").unwrap();
        assert_eq!(filters.first_active_uri_part(), Some("release/2020"));
    }

    #[test]
    fn unknown_filter_or_option_is_an_error() {
        let mut filters = sample();
        assert!(filters.apply_state("nope", "x").is_err());
        assert!(filters.apply_state("status", "paused").is_err());
    }

    #[test]
    fn select_accepts_numeric_index() {
        let mut filters = sample();
        filters.apply_state("Status", "1").unwrap();
        assert_eq!(filters.select("status").unwrap().uri_part(), "ongoing");
    }
}
