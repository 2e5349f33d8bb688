//! URL composition helpers for upstream forwarding.

/// Joins a service base URL with an upstream path, normalizing the slash at
/// the boundary so `compose("http://s", "/x") == compose("http://s/", "/x")`.
pub fn compose_upstream_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return format!("{}/", base);
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Sorts the `&`-separated pairs of a query string for stable cache
/// fingerprints.
pub fn canonical_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<&str> = query.split('&').collect();
    pairs.sort_unstable();
    pairs.join("&")
}
