//! Link resolution and site identity
//!
//! Relative links are resolved by swapping path and query into the page URL,
//! then canonicalised. Site/network names default to the registrable domain
//! label of the page URL.

use url::Url;

/// Second-level public suffixes that precede the registrable label
const TWO_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "me.uk", "ltd.uk", "com.au", "net.au", "org.au", "co.nz", "co.jp",
    "ne.jp", "com.br", "com.mx", "co.za", "co.in", "com.ar", "com.tr", "co.kr", "com.cn",
    "com.tw", "com.hk", "com.sg", "com.es", "com.pl", "co.il",
];

/// Percent-decode and re-serialise a URL into canonical form
pub fn prepare_url(url: &str) -> String {
    let decoded = urlencoding::decode(url)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| url.to_string());

    match Url::parse(&decoded) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => decoded,
    }
}

fn is_absolute(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(u) => !u.cannot_be_a_base() || u.scheme() == "data",
        Err(_) => false,
    }
}

/// Resolve `candidate` against the page URL `base`.
///
/// - absolute URLs are returned unchanged
/// - protocol-relative `//host/...` gets an `https:` prefix
/// - anything else replaces the path and query of `base`
pub fn resolve_link(base: &str, candidate: &str) -> String {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return String::new();
    }

    if candidate.starts_with("//") {
        return format!("https:{}", candidate);
    }

    if is_absolute(candidate) {
        return candidate.to_string();
    }

    let mut url = match Url::parse(base) {
        Ok(u) => u,
        Err(_) => return candidate.to_string(),
    };

    let without_fragment = candidate.split('#').next().unwrap_or_default();
    let (path, query) = match without_fragment.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (without_fragment, None),
    };

    url.set_path(path);
    url.set_query(query.filter(|q| !q.is_empty()));

    prepare_url(url.as_str())
}

/// Registrable domain label of a URL: `https://www.example.co.uk/x` -> `example`
pub fn registrable_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();

    if parsed.host().is_some_and(|h| !matches!(h, url::Host::Domain(_))) {
        return Some(host);
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let label = match labels.len() {
        0 => return None,
        1 => labels[0],
        n => {
            let tail = format!("{}.{}", labels[n - 2], labels[n - 1]);
            if n >= 3 && TWO_LEVEL_SUFFIXES.contains(&tail.as_str()) {
                labels[n - 3]
            } else {
                labels[n - 2]
            }
        }
    };

    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_path_and_query() {
        assert_eq!(
            resolve_link("https://a.com/p/q", "/x?y=1"),
            "https://a.com/x?y=1"
        );
    }

    #[test]
    fn test_resolve_protocol_relative() {
        assert_eq!(
            resolve_link("https://a.com/p/q", "//cdn.com/img.jpg"),
            "https://cdn.com/img.jpg"
        );
    }

    #[test]
    fn test_resolve_absolute_unchanged() {
        assert_eq!(
            resolve_link("https://a.com/p/q", "https://x.com/a"),
            "https://x.com/a"
        );
        assert_eq!(resolve_link("https://a.com/p/q", "http://x.com"), "http://x.com");
    }

    #[test]
    fn test_resolve_drops_base_query() {
        assert_eq!(
            resolve_link("https://a.com/list?page=2", "scene/12"),
            "https://a.com/scene/12"
        );
    }

    #[test]
    fn test_resolve_decodes_and_canonicalises() {
        assert_eq!(
            resolve_link("https://a.com/", "/media/big%20poster.jpg"),
            "https://a.com/media/big%20poster.jpg"
        );
        assert_eq!(resolve_link("https://a.com/", ""), "");
        assert_eq!(resolve_link("not a url", "/x"), "/x");
    }

    #[test]
    fn test_prepare_url() {
        assert_eq!(
            prepare_url("https://a.com/a%2Fb?x=%31"),
            "https://a.com/a/b?x=1"
        );
        assert_eq!(prepare_url("HTTPS://A.COM"), "https://a.com/");
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(
            registrable_domain("https://www.example.com/scene/1"),
            Some("example".to_string())
        );
        assert_eq!(
            registrable_domain("https://tour.example.co.uk/"),
            Some("example".to_string())
        );
        assert_eq!(
            registrable_domain("http://localhost:8080/x"),
            Some("localhost".to_string())
        );
        assert_eq!(
            registrable_domain("http://127.0.0.1/x"),
            Some("127.0.0.1".to_string())
        );
        assert_eq!(registrable_domain("relative/path"), None);
    }
}
