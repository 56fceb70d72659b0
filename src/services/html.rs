use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

fn img_tag_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<img\b[^>]*>"#).ok()).as_ref()
}

fn src_attr_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).ok())
        .as_ref()
}

/// Absolute http(s) URLs of every `<img src>` in `html`, first occurrence wins.
pub fn extract_image_urls_from_html(html: &str, base_url: &str) -> Vec<String> {
    let (Some(img_re), Some(src_re)) = (img_tag_re(), src_attr_re()) else {
        return Vec::new();
    };
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for tag in img_re.find_iter(html) {
        let Some(src) = src_re.captures(tag.as_str()).and_then(|cap| {
            cap.get(1)
                .or_else(|| cap.get(2))
                .or_else(|| cap.get(3))
                .map(|m| m.as_str().trim())
        }) else {
            continue;
        };
        if src.is_empty() {
            continue;
        }

        let Some(resolved) = resolve_url(src, base.as_ref()) else {
            continue;
        };
        if seen.insert(resolved.clone()) {
            urls.push(resolved);
        }
    }

    urls
}

/// Resolve a potentially relative URL, keeping only http(s) results.
fn resolve_url(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.replace("&amp;", "&");
    let url = match Url::parse(&href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(&href).ok()?,
        Err(_) => return None,
    };

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}
