// ABOUTME: Classifies an incoming downstream request into a response strategy
// ABOUTME: Mirrors the origin's pragma-sniffing rules, not HTTP routing (there is exactly one path)

use crate::pragma::{self, PragmaMap};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
    pub version: String,
}

/// A fully parsed downstream request: request line, lowercase-keyed headers,
/// and the `Pragma` sub-map (already lowercase-keyed, see [`pragma::parse`]).
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub line: RequestLine,
    pub headers: HashMap<String, String>,
    pub pragma: PragmaMap,
}

const STREAMING_PRAGMAS: [&str; 3] = ["xplaystrm", "stream-switch-count", "stream-switch-entry"];
const HEADER_PRAGMAS: [&str; 9] = [
    "xplaystrm",
    "stream-switch-count",
    "stream-switch-entry",
    "rate",
    "stream-time",
    "stream-offset",
    "request-context",
    "max-duration",
    "xclientguid",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    LogPost,
    NotReady,
    Streaming,
    HeaderOnly,
    Playlist { href: String },
    ShoutcastProbe,
    UnknownHeaders,
}

/// Rewrites a two-token request line (`"GET HTTP/1.0"`) by inserting the
/// missing path, tolerating a malformed request line.
pub fn normalize_request_line(line: &str) -> String {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() == 2 && tokens[1].starts_with("HTTP/") {
        format!("{} / {}", tokens[0], tokens[1])
    } else {
        line.to_string()
    }
}

pub fn parse_request_line(line: &str) -> Option<RequestLine> {
    let normalized = normalize_request_line(line);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.len() < 2 {
        return None;
    }
    Some(RequestLine {
        method: tokens[0].to_string(),
        path: tokens[1].to_string(),
        version: tokens.get(2).copied().unwrap_or("HTTP/1.0").to_string(),
    })
}

pub fn parse_headers(lines: &[String]) -> (HashMap<String, String>, PragmaMap) {
    let mut headers = HashMap::new();
    let mut pragma = PragmaMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_lowercase();
            let value = value.trim().to_string();
            if name == "pragma" {
                pragma = pragma::parse(&value);
            }
            headers.insert(name, value);
        }
    }
    (headers, pragma)
}

/// Classifies a GET/POST request. Callers are expected to have already ruled
/// out anything that isn't GET or POST at the transport layer.
pub fn classify(req: &ParsedRequest, is_ready: bool, server_port: u16) -> Classification {
    if req.line.method.eq_ignore_ascii_case("POST") && req.pragma.contains_key("log-line") {
        return Classification::LogPost;
    }
    if !is_ready {
        return Classification::NotReady;
    }

    let is_streaming = STREAMING_PRAGMAS.iter().any(|k| req.pragma.contains_key(*k))
        || req
            .pragma
            .get("request-context")
            .is_some_and(|v| v != "1");
    if is_streaming {
        return Classification::Streaming;
    }

    if HEADER_PRAGMAS.iter().any(|k| req.pragma.contains_key(*k)) {
        return Classification::HeaderOnly;
    }

    if req.headers.contains_key("icy-metadata") {
        return Classification::ShoutcastProbe;
    }

    match req.headers.get("host") {
        Some(host) => Classification::Playlist {
            href: mms_url(host, &req.line.path, server_port),
        },
        None => Classification::UnknownHeaders,
    }
}

fn mms_url(host_header: &str, path: &str, server_port: u16) -> String {
    if host_header.contains(':') {
        format!("mms://{host_header}{path}")
    } else {
        format!("mms://{host_header}:{server_port}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(method: &str, path: &str, pragma: &[(&str, &str)], headers: &[(&str, &str)]) -> ParsedRequest {
        let mut pragma_map = PragmaMap::new();
        for (k, v) in pragma {
            pragma_map.insert(k.to_string(), v.to_string());
        }
        let mut header_map = HashMap::new();
        for (k, v) in headers {
            header_map.insert(k.to_lowercase(), v.to_string());
        }
        ParsedRequest {
            line: RequestLine {
                method: method.to_string(),
                path: path.to_string(),
                version: "HTTP/1.1".to_string(),
            },
            headers: header_map,
            pragma: pragma_map,
        }
    }

    #[test]
    fn malformed_two_token_request_line_gets_a_path() {
        assert_eq!(normalize_request_line("GET HTTP/1.0"), "GET / HTTP/1.0");
        assert_eq!(normalize_request_line("GET /live HTTP/1.0"), "GET /live HTTP/1.0");
    }

    #[test]
    fn streaming_pragma_wins() {
        let r = req("GET", "/live", &[("xplaystrm", "1")], &[]);
        assert_eq!(classify(&r, true, 8080), Classification::Streaming);
    }

    #[test]
    fn request_context_not_one_is_streaming() {
        let r = req("GET", "/live", &[("request-context", "2")], &[]);
        assert_eq!(classify(&r, true, 8080), Classification::Streaming);
    }

    #[test]
    fn header_only_pragma_without_streaming_flags() {
        let r = req("GET", "/live", &[("rate", "1.0")], &[]);
        assert_eq!(classify(&r, true, 8080), Classification::HeaderOnly);
    }

    #[test]
    fn plain_browser_with_host_gets_playlist() {
        let r = req("GET", "/live", &[], &[("Host", "cdn.example:9000")]);
        assert_eq!(
            classify(&r, true, 8080),
            Classification::Playlist {
                href: "mms://cdn.example:9000/live".to_string()
            }
        );
    }

    #[test]
    fn playlist_host_without_port_gets_server_port_appended() {
        let r = req("GET", "/live", &[], &[("Host", "cdn.example")]);
        assert_eq!(
            classify(&r, true, 8080),
            Classification::Playlist {
                href: "mms://cdn.example:8080/live".to_string()
            }
        );
    }

    #[test]
    fn shoutcast_probe_without_host() {
        let r = req("GET", "/", &[], &[("Icy-MetaData", "1")]);
        assert_eq!(classify(&r, true, 8080), Classification::ShoutcastProbe);
    }

    #[test]
    fn no_host_no_icy_is_unknown_headers() {
        let r = req("GET", "/", &[], &[]);
        assert_eq!(classify(&r, true, 8080), Classification::UnknownHeaders);
    }

    #[test]
    fn not_ready_short_circuits_everything_but_log_post() {
        let r = req("GET", "/live", &[("xplaystrm", "1")], &[]);
        assert_eq!(classify(&r, false, 8080), Classification::NotReady);
    }

    #[test]
    fn log_post_wins_even_when_not_ready() {
        let r = req("POST", "/", &[("log-line", "x")], &[]);
        assert_eq!(classify(&r, false, 8080), Classification::LogPost);
    }
}
