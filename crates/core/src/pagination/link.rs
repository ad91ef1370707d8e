//! `Link` response header parsing (RFC 8288 subset)

use pelagic_domain::Cursor;

/// Cursors advertised by a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    /// `rel="prev"`
    pub previous: Option<Cursor>,
    /// `rel="next"`
    pub next: Option<Cursor>,
}

/// Extract the `prev` and `next` targets from a `Link` header value.
///
/// Entries are matched by their `rel` parameter, not their position.
/// Malformed entries are skipped; the first entry for each relation wins.
pub fn parse_link_header(value: &str) -> PageLinks {
    let mut links = PageLinks::default();

    for entry in split_entries(value) {
        let Some((target, params)) = entry.trim().strip_prefix('<').and_then(|e| e.split_once('>'))
        else {
            continue;
        };

        for relation in relations(params) {
            let slot = match relation.to_ascii_lowercase().as_str() {
                "prev" | "previous" => &mut links.previous,
                "next" => &mut links.next,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(Cursor::new(target.trim()));
            }
        }
    }

    links
}

/// Split on commas that are outside `<...>` and quoted strings.
fn split_entries(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_target = false;
    let mut in_quotes = false;

    for (index, ch) in value.char_indices() {
        match ch {
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            '"' if !in_target => in_quotes = !in_quotes,
            ',' if !in_target && !in_quotes => {
                entries.push(&value[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

/// Space-separated values of every `rel` parameter in `params`.
fn relations(params: &str) -> impl Iterator<Item = &str> {
    params
        .split(';')
        .filter_map(|param| param.split_once('='))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case("rel"))
        .flat_map(|(_, value)| value.trim().trim_matches('"').split_whitespace())
}
