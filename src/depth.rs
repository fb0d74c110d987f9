use url::Url;

/// Number of path segments `url` lies below `base`.
///
/// Returns `None` when `url` is not on the same origin or not at/below the
/// base path. Query and fragment are ignored and trailing slashes do not
/// count as a segment, so `https://h/guide/` and `https://h/guide` both sit
/// at depth 0 relative to a base of `https://h/guide/`.
pub fn url_depth(url: &Url, base: &Url) -> Option<u32> {
    if url.scheme() != base.scheme()
        || url.host_str() != base.host_str()
        || url.port_or_known_default() != base.port_or_known_default()
    {
        return None;
    }

    let base_segments = path_segments(base);
    let url_segments = path_segments(url);
    if url_segments.len() < base_segments.len() {
        return None;
    }
    if url_segments
        .iter()
        .zip(base_segments.iter())
        .any(|(a, b)| a != b)
    {
        return None;
    }

    u32::try_from(url_segments.len() - base_segments.len()).ok()
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect()
}
