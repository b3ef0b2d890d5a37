//! Route resolution against the configured server root.

/// Join `route` onto `base`.
///
/// Path segments from both sides are kept and joined with exactly one
/// slash. The result ends in a slash when the route does (or, for an empty
/// route path, when the base does). A query or fragment on the route wins
/// over one on the base. Absolute URLs are returned as given.
///
/// ```rust
/// use brain_client::resolve;
///
/// assert_eq!(resolve("https://host/base/", "/route/"), "https://host/base/route/");
/// assert_eq!(resolve("https://host/base/", "route/"), "https://host/base/route/");
/// assert_eq!(resolve("https://host/base/", ""), "https://host/base/");
/// ```
pub fn resolve(base: &str, route: &str) -> String {
    if route.is_empty() {
        return base.to_string();
    }
    if route.starts_with(base) || is_absolute(route) {
        return route.to_string();
    }

    let (base_path_part, base_suffix) = split_suffix(base);
    let (route_path, route_suffix) = split_suffix(route);
    let (origin, base_path) = split_origin(base_path_part);

    let segments = base_path
        .split('/')
        .chain(route_path.split('/'))
        .filter(|segment| !segment.is_empty());

    let mut url = origin.to_string();
    let mut empty = true;
    for segment in segments {
        url.push('/');
        url.push_str(segment);
        empty = false;
    }

    let trailing = if route_path.is_empty() {
        base_path.ends_with('/')
    } else {
        route_path.ends_with('/')
    };
    if trailing || (empty && !origin.is_empty()) {
        url.push('/');
    }

    // a relative base keeps its own leading-slash convention
    if origin.is_empty() && !base_path.starts_with('/') {
        url = url.trim_start_matches('/').to_string();
    }

    url.push_str(if route_suffix.is_empty() {
        base_suffix
    } else {
        route_suffix
    });
    url
}

fn is_absolute(route: &str) -> bool {
    route.starts_with("http://") || route.starts_with("https://")
}

/// Split at the first `?` or `#`, keeping the delimiter with the suffix.
fn split_suffix(s: &str) -> (&str, &str) {
    match s.find(['?', '#']) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    }
}

/// Split `scheme://authority` from the path.
fn split_origin(s: &str) -> (&str, &str) {
    match s.find("://") {
        Some(scheme_end) => {
            let authority_start = scheme_end + 3;
            match s[authority_start..].find('/') {
                Some(idx) => s.split_at(authority_start + idx),
                None => (s, ""),
            }
        }
        None => ("", s),
    }
}
