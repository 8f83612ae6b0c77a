// src/extract.rs
//! Turns a raw metric-page fragment into four directional volume readings.
//! Pure and panic-free: malformed or absent tables degrade to empty readings,
//! never to an error.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::harvest::types::VolumeReading;

fn re_bordered_table() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<table[^>]*class\s*=\s*["'][^"']*table-bordered[^"']*["'][^>]*>(.*?)</table>"#)
            .unwrap()
    })
}

fn re_cell() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").unwrap())
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap())
}

/// Inner text of one table cell: strip nested tags, decode entities, trim.
fn cell_text(raw: &str) -> String {
    let stripped = re_tags().replace_all(raw, "");
    html_escape::decode_html_entities(stripped.as_ref())
        .trim()
        .to_string()
}

/// Parse a reported value: drop thousands separators, accept pure digits only.
pub fn parse_volume(raw: &str) -> Option<u32> {
    let cleaned = raw.replace(',', "");
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Extract the four directional totals from a metric-page body.
///
/// Walks every bordered metric table, treating `<td>` cells as alternating
/// label/value pairs. Labels are matched case-insensitively by substring
/// containment; the first occurrence of a direction wins and later duplicates
/// are ignored (the portal repeats the same table in some layouts).
pub fn extract(body: &str) -> VolumeReading {
    let mut westbound: Option<String> = None;
    let mut eastbound: Option<String> = None;
    let mut northbound: Option<String> = None;
    let mut southbound: Option<String> = None;

    for table in re_bordered_table().captures_iter(body) {
        let cells: Vec<String> = re_cell()
            .captures_iter(&table[1])
            .map(|c| cell_text(&c[1]))
            .collect();
        for pair in cells.chunks(2) {
            let [label, value] = pair else { continue };
            let label = label.to_lowercase();
            let slot = if label.contains("westbound total volume") {
                &mut westbound
            } else if label.contains("eastbound total volume") {
                &mut eastbound
            } else if label.contains("northbound total volume") {
                &mut northbound
            } else if label.contains("southbound total volume") {
                &mut southbound
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(value.clone());
            }
        }
    }

    VolumeReading {
        westbound: westbound.as_deref().and_then(parse_volume),
        eastbound: eastbound.as_deref().and_then(parse_volume),
        northbound: northbound.as_deref().and_then(parse_volume),
        southbound: southbound.as_deref().and_then(parse_volume),
    }
}
