// ABOUTME: Renders and parses the MMS `Pragma` header sub-map (comma-joined name[=value] tokens)
// ABOUTME: Shared by the upstream client (renders) and the downstream server (parses)

use std::collections::BTreeMap;

/// An ordered name -> value map. `BTreeMap` gives deterministic rendering
/// order, which matters for matching a fixed set of upstream phase headers.
pub type PragmaMap = BTreeMap<String, String>;

/// Renders a pragma map as `name=value` tokens joined by `, `; a value-less
/// key (empty string) renders as a bare `name`.
pub fn render(map: &PragmaMap) -> String {
    map.iter()
        .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses a `Pragma` header value into a lowercased-key map. Tokens without
/// `=` get an empty-string value.
pub fn parse(header_value: &str) -> PragmaMap {
    let mut map = PragmaMap::new();
    for token in header_value.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('=') {
            Some((key, value)) => {
                map.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
            None => {
                map.insert(token.to_lowercase(), String::new());
            }
        }
    }
    map
}
