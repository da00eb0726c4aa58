use super::config::CrawlerConfig;

/// Verdict on a single discovered link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDecision {
    pub valid: bool,
    /// Absolute form of the link, used as the store key
    pub link: String,
    pub next_depth: usize,
}

/// Decides whether `raw_link`, found on a page at depth `discovered_at`,
/// should be followed. First matching rule wins:
/// blacklisted, site-relative, absolute in-site, absolute external, anything else.
///
/// External links are pinned to `max_depth` so they get fetched once but never expanded.
pub fn classify(raw_link: &str, discovered_at: usize, config: &CrawlerConfig) -> LinkDecision {
    let mut decision = LinkDecision {
        valid: true,
        link: raw_link.to_string(),
        next_depth: discovered_at + 1,
    };

    if is_blacklisted(raw_link, config) {
        decision.valid = false;
        return decision;
    }

    if raw_link.starts_with('/') {
        decision.link = format!("{}{}", config.site_url, raw_link);
        return decision;
    }

    if raw_link.starts_with(&config.site_url) {
        return decision;
    }

    // "http" also covers "https"
    if raw_link.starts_with("http") || raw_link.starts_with("www") {
        decision.next_depth = config.max_depth;
        decision.valid = config.follow_external_links;
        return decision;
    }

    // mailto:, javascript:, bare relative paths, empty strings
    decision.valid = false;
    decision
}

/// Rejects nothing unless patterns are configured
pub fn is_blacklisted(link: &str, config: &CrawlerConfig) -> bool {
    config
        .blacklist
        .iter()
        .any(|pattern| !pattern.is_empty() && link.contains(pattern.as_str()))
}
