//! Derives the rendered sequence from the accumulated records.

use aho_corasick::AhoCorasick;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::records::Record;

/// Sort selection of a list view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Accumulated (server) order
    #[default]
    Default,
    NameAsc,
    NameDesc,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "name-asc" | "asc" | "a-z" => Ok(Self::NameAsc),
            "name-desc" | "desc" | "z-a" => Ok(Self::NameDesc),
            other => Err(format!(
                "unknown sort '{}' (expected default, name-asc or name-desc)",
                other
            )),
        }
    }
}

/// Order records by `sort`. Ties keep their accumulated order.
pub fn project<R: Record>(items: &[R], sort: SortKey) -> Vec<&R> {
    let mut view: Vec<&R> = items.iter().collect();
    sort_view(&mut view, sort);
    view
}

fn sort_view<R: Record>(view: &mut [&R], sort: SortKey) {
    match sort {
        SortKey::Default => {}
        SortKey::NameAsc => view.sort_by(|a, b| compare_names(a.display_name(), b.display_name())),
        SortKey::NameDesc => view.sort_by(|a, b| compare_names(b.display_name(), a.display_name())),
    }
}

/// Client-side text filter for views backed by static data: a record matches
/// when any of its search fields contains `query`, ignoring case.
pub fn filter_local<'a, R: Record>(items: &'a [R], query: &str) -> Vec<&'a R> {
    let query = query.trim();
    if query.is_empty() {
        return items.iter().collect();
    }

    let query_lower = query.to_lowercase();
    let ac = match AhoCorasick::new([&query_lower]) {
        Ok(ac) => ac,
        Err(e) => {
            tracing::warn!("Failed to build matcher for '{}': {}", query, e);
            return Vec::new();
        }
    };

    items
        .iter()
        .filter(|r| {
            r.search_fields()
                .iter()
                .any(|field| ac.is_match(&field.to_lowercase()))
        })
        .collect()
}

/// Filter then sort, for static-data views.
pub fn project_local<'a, R: Record>(items: &'a [R], query: &str, sort: SortKey) -> Vec<&'a R> {
    let mut view = filter_local(items, query);
    sort_view(&mut view, sort);
    view
}

/// Case- and accent-insensitive comparison, falling back to the raw strings
/// so the order is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

fn collation_key(s: &str) -> String {
    s.trim().chars().flat_map(char::to_lowercase).map(fold_accent).collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'è' | 'é' | 'ê' | 'ë' | 'ē' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'ñ' | 'ń' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' => 'u',
        'ý' | 'ÿ' => 'y',
        'š' | 'ś' => 's',
        'ž' | 'ź' | 'ż' => 'z',
        other => other,
    }
}
