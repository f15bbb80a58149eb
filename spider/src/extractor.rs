//! Link extraction from raw HTTP responses
//!
//! Works on the raw bytes of a response (status line and headers included)
//! without parsing HTML. Candidates are found by scanning for a few literal
//! markers and filtered by a cheap validity check.

/// Markers that introduce a link candidate, scanned in this order
const URL_MARKERS: [&str; 4] = ["href=\"", "href = \"", "http://", "https://"];

/// Characters that end a link candidate. `#` and `?` drop fragments and queries.
const URL_END_CHARS: [char; 5] = ['"', '#', '?', ',', ' '];

const ALLOWED_DOMAINS: [&str; 6] = [".com", ".sg", ".net", ".co", ".org", ".me"];

const FORBIDDEN_TYPES: [&str; 7] = [".css", ".js", ".pdf", ".png", ".jpeg", ".jpg", ".ico"];

fn is_allowed_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b".,/\":#?+-_= ".contains(&b)
}

/// Flatten a response into lowercase printable text.
///
/// Allowed bytes are lowercased, newlines become spaces and everything else is
/// dropped. Running it on its own output returns the same text.
pub fn sanitize(raw: &[u8]) -> String {
    raw.iter()
        .filter_map(|&b| match b {
            b'\n' => Some(' '),
            b if is_allowed_byte(b) => Some(b.to_ascii_lowercase() as char),
            _ => None,
        })
        .collect()
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Hostname part of a url, empty for a relative path like `/about`
pub fn parse_host(url: &str) -> &str {
    let rest = strip_scheme(url);
    match rest.find('/') {
        Some(pos) => &rest[..pos],
        None => rest,
    }
}

/// Path part of a url, always starting with a single `/`
pub fn parse_path(url: &str) -> &str {
    let rest = strip_scheme(url);
    let Some(pos) = rest.find('/') else {
        return "/";
    };
    let path = &rest[pos..];
    match path.find(|c: char| c != '/') {
        // keep exactly one of the leading slashes
        Some(first) => &path[first - 1..],
        None => "/",
    }
}

fn verify_domain(host: &str) -> bool {
    ALLOWED_DOMAINS.iter().any(|suffix| host.ends_with(*suffix))
}

fn verify_type(url: &str) -> bool {
    !FORBIDDEN_TYPES.iter().any(|ty| url.contains(*ty))
}

/// Decide whether a candidate is worth requesting.
///
/// Rejects hosts outside the allowed top level domains, static assets and
/// `mailto:` links. Relative candidates skip the domain check.
pub fn verify_url(url: &str) -> bool {
    let host = parse_host(url);
    if !host.is_empty() && !verify_domain(host) {
        return false;
    }
    if !verify_type(url) {
        return false;
    }
    !url.contains("mailto:")
}

/// Extract `(host, path)` pairs from sanitized text.
///
/// An empty host means the link is relative to the page it was found on.
/// Every marker scans the whole text on its own, so the same url can show up
/// more than once; callers deduplicate.
pub fn extract_links(text: &str) -> Vec<(String, String)> {
    let mut links = Vec::new();

    for marker in URL_MARKERS {
        let mut rest = text;
        while let Some(found) = rest.find(marker) {
            let tail = &rest[found + marker.len()..];
            let end = tail.find(URL_END_CHARS).unwrap_or(tail.len());
            let candidate = &tail[..end];

            if verify_url(candidate) {
                links.push((
                    parse_host(candidate).to_string(),
                    parse_path(candidate).to_string(),
                ));
            }

            rest = &tail[end..];
        }
    }

    links
}

/// Sanitize a raw response and extract its links
pub fn extract_urls(raw: &[u8]) -> Vec<(String, String)> {
    extract_links(&sanitize(raw))
}
