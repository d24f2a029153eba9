//! Raw spreadsheet URL → canonical domain.
//!
//! Normalization never fails: input that does not parse as a host degrades
//! to the cleaned string.

use std::sync::LazyLock;

use enricher_shared::CanonicalDomain;
use regex::Regex;
use url::Url;

/// Characters spreadsheet exports leave around URLs.
const STRAY_CHARS: &[char] = &['[', ']', '\'', '"'];

/// Normalize a raw URL or domain string into the cache/lookup key.
///
/// Lowercases, strips any scheme, a leading `www.`, stray bracket/quote
/// characters and trailing slashes, then reduces the rest to its hostname.
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> CanonicalDomain {
    let cleaned = clean(raw);

    let host = Url::parse(&format!("http://{cleaned}"))
        .ok()
        .and_then(|url| url.host_str().map(|h| strip_www(h).to_string()))
        .filter(|h| !h.is_empty());

    CanonicalDomain::from_normalized(host.unwrap_or(cleaned))
}

/// Apply the cleaning steps until the string stops changing.
fn clean(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = clean_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_once(input: &str) -> String {
    static SCHEME_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9+.-]*://").expect("valid regex"));

    let mut s: String = input.chars().filter(|c| !STRAY_CHARS.contains(c)).collect();
    s = s.trim().to_lowercase();

    while let Some(m) = SCHEME_RE.find(&s) {
        s = s[m.end()..].to_string();
    }

    strip_www(&s).trim_end_matches('/').to_string()
}

fn strip_www(mut s: &str) -> &str {
    while let Some(rest) = s.strip_prefix("www.") {
        s = rest;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        normalize(raw).as_str().to_string()
    }

    #[test]
    fn strips_scheme_www_and_slash() {
        assert_eq!(norm("https://www.acme.com/"), "acme.com");
        assert_eq!(norm("http://acme.com"), "acme.com");
        assert_eq!(norm("ACME.COM"), "acme.com");
        assert_eq!(norm("www.Acme.com//"), "acme.com");
    }

    #[test]
    fn strips_spreadsheet_artifacts() {
        assert_eq!(norm("['https://globex.io']"), "globex.io");
        assert_eq!(norm("\"initech.com\""), "initech.com");
        assert_eq!(norm("  https://www.hooli.xyz  "), "hooli.xyz");
    }

    #[test]
    fn reduces_to_hostname() {
        assert_eq!(norm("https://acme.com/about?ref=x"), "acme.com");
        assert_eq!(norm("acme.com:8443/path"), "acme.com");
        assert_eq!(norm("ftp://files.acme.com"), "files.acme.com");
        assert_eq!(norm("https://https://www.acme.com"), "acme.com");
    }

    #[test]
    fn unparseable_input_falls_back_to_cleaned_string() {
        assert_eq!(norm("bad url"), "bad url");
        assert_eq!(norm("[Bad URL]/"), "bad url");
        assert_eq!(norm(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "https://www.acme.com/",
            "ACME.COM",
            "bad url",
            "['https://globex.io']",
            "www.www.example.org/",
            "http://user@www.acme.com/x",
            "acme.com:8443/path",
            "https://bücher.de",
            "//acme.com",
            "www.",
            "   ",
            "mailto:someone@acme.com",
            "http://[::1]/",
        ];
        for raw in samples {
            let once = normalize(raw);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }
}
