//! `Link` header pagination (RFC 8288).

use crate::connector::Pagination;
use crate::context::PAGE_INFO_PARAM;
use url::Url;

/// One `<uri>; param=value` entry of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkValue {
    /// Target URI.
    pub uri: String,
    /// Relation types (`rel` may list several, space separated).
    pub rels: Vec<String>,
}

/// Parses a `Link` header into its entries. Malformed entries are skipped.
pub fn parse_link_header(header: &str) -> Vec<LinkValue> {
    split_entries(header)
        .into_iter()
        .filter_map(parse_entry)
        .collect()
}

// Commas may appear inside the URI, so only split outside `<...>` and quotes.
fn split_entries(header: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_uri = false;
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in header.char_indices() {
        match c {
            '<' if !in_quotes => in_uri = true,
            '>' if !in_quotes => in_uri = false,
            '"' if !in_uri => in_quotes = !in_quotes,
            ',' if !in_uri && !in_quotes => {
                entries.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&header[start..]);
    entries
}

fn parse_entry(entry: &str) -> Option<LinkValue> {
    let entry = entry.trim();
    let rest = entry.strip_prefix('<')?;
    let end = rest.find('>')?;
    let uri = rest[..end].trim().to_string();

    let rels = rest[end + 1..]
        .split(';')
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("rel")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .flat_map(|value| {
            value
                .split_whitespace()
                .map(str::to_ascii_lowercase)
                .collect::<Vec<_>>()
        })
        .collect();

    Some(LinkValue { uri, rels })
}

/// Extracts the next-page token from a `Link` header.
///
/// Returns the `page_info` query parameter of the `rel="next"` link, or the
/// full link URI when it carries none.
pub fn next_page_token(header: &str) -> Option<String> {
    let next = parse_link_header(header)
        .into_iter()
        .find(|link| link.rels.iter().any(|rel| rel == "next"))?;

    let page_info = Url::parse(&next.uri).ok().and_then(|url| {
        url.query_pairs()
            .find(|(k, _)| k == PAGE_INFO_PARAM)
            .map(|(_, v)| v.into_owned())
    });

    Some(page_info.unwrap_or(next.uri))
}

impl Pagination {
    /// Builds pagination metadata from an optional `Link` header.
    pub fn from_link_header(header: Option<&str>) -> Self {
        match header.and_then(next_page_token) {
            Some(token) => Pagination::next(token),
            None => Pagination::last(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP: &str = concat!(
        "<https://acme.shop.test/admin/api/orders.json?limit=50&page_info=prev123>; rel=\"previous\", ",
        "<https://acme.shop.test/admin/api/orders.json?limit=50&page_info=next456>; rel=\"next\""
    );

    #[test]
    fn takes_page_info_of_next_link() {
        assert_eq!(next_page_token(SHOP).as_deref(), Some("next456"));
        assert_eq!(
            Pagination::from_link_header(Some(SHOP)),
            Pagination::next("next456")
        );
    }

    #[test]
    fn falls_back_to_full_uri() {
        let header = "<https://api.example.com/items?cursor=9>; rel=\"next\"";
        assert_eq!(
            next_page_token(header).as_deref(),
            Some("https://api.example.com/items?cursor=9")
        );
    }

    #[test]
    fn no_next_link_means_last_page() {
        let header = "<https://api.example.com/items?page=1>; rel=\"prev\"";
        assert_eq!(Pagination::from_link_header(Some(header)), Pagination::last());
        assert_eq!(Pagination::from_link_header(None), Pagination::last());
        assert_eq!(Pagination::from_link_header(Some("")), Pagination::last());
    }

    #[test]
    fn commas_inside_uri_and_multiple_rels() {
        let header = "<https://api.example.com/a?ids=1,2,3>; rel=\"first next\"; title=\"x, y\"";
        let links = parse_link_header(header);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].uri, "https://api.example.com/a?ids=1,2,3");
        assert_eq!(links[0].rels, vec!["first", "next"]);
    }

    #[test]
    fn unquoted_rel_and_garbage() {
        let header = "garbage, <https://api.example.com/b?page_info=z>; REL=next";
        assert_eq!(next_page_token(header).as_deref(), Some("z"));
    }
}
