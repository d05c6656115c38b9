//! URL heuristics shared by the resolver and the server collectors.

use url::Url;

const ASSET_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".json", ".xml", ".txt", ".pdf", ".zip", ".rar", ".jpg", ".jpeg", ".png",
    ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
];

const ASSET_DIRS: &[&str] = &[
    "/wp-content/",
    "/wp-includes/",
    "/themes/",
    "/plugins/",
    "/assets/",
    "/static/",
    "/css/",
    "/js/",
    "/fonts/",
    "/images/",
];

pub const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".m3u8", ".webm", ".mkv", ".flv"];

/// Tokens that make a script value look like a video reference.
const VIDEO_INDICATORS: &[&str] = &[
    ".mp4", ".m3u8", ".webm", ".mkv", ".flv", "video", "stream", "cdn", "media", "dood",
    "streamtape", "mixdrop",
];

/// Narrower set used for `data-*` attribute values.
const DATA_MEDIA_INDICATORS: &[&str] = &[".mp4", ".m3u8", ".webm", "video", "stream", "cdn"];

const TRACKING_KEYWORDS: &[&str] = &[
    "analytics",
    "tracking",
    "advert",
    "doubleclick",
    "facebook",
    "twitter",
    "instagram",
    "google-analytics",
];

/// Whole tokens only, so "uploads" or "loads" do not trip the filter.
const TRACKING_TOKENS: &[&str] = &["ads", "ad"];

const IFRAME_DENYLIST: &[&str] = &[
    "facebook",
    "twitter",
    "instagram",
    "youtube.com/channel",
    "google",
    "doubleclick",
    "advert",
];

/// `//host/path` becomes `https://host/path`; everything else is untouched.
pub fn normalize_scheme(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("//") {
        format!("https:{}", raw)
    } else {
        raw.to_string()
    }
}

/// Resolves a reference found in a page against that page's URL.
/// Only http(s) results are returned.
pub fn absolutize(raw: &str, base: &Url) -> Option<Url> {
    let raw = normalize_scheme(&raw.replace("\\/", "/"));
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
        return None;
    }
    let url = base.join(&raw).ok()?;
    is_http(&url).then_some(url)
}

/// Parses an absolute http(s) reference, accepting `//` forms.
pub fn parse_absolute(raw: &str) -> Option<Url> {
    let raw = normalize_scheme(&raw.replace("\\/", "/"));
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return None;
    }
    Url::parse(&raw).ok().filter(is_http)
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
}

/// Stylesheet/script/image/archive/font file by extension. Checked against
/// the path only, so query strings and hosts such as `cdn.js.example` never
/// trigger it.
pub fn has_asset_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Path under a static directory such as `/wp-content/` or `/assets/`.
pub fn in_asset_dir(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    ASSET_DIRS.iter().any(|dir| path.contains(dir))
}

/// Pages never worth fetching: asset files and anything in a static
/// directory. Media found on a page is only rejected by
/// [`has_asset_extension`], since uploads live under `/wp-content/`.
pub fn is_asset_url(url: &Url) -> bool {
    has_asset_extension(url) || in_asset_dir(url)
}

pub fn has_media_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn has_video_indicator(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    VIDEO_INDICATORS.iter().any(|token| lower.contains(token))
}

pub fn has_data_media_indicator(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    DATA_MEDIA_INDICATORS.iter().any(|token| lower.contains(token))
}

pub fn is_tracking(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if TRACKING_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return true;
    }
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| TRACKING_TOKENS.contains(&token))
}

/// Iframe targets never worth following (social widgets, ads, analytics).
pub fn is_denied_iframe(url: &Url) -> bool {
    let lower = url.as_str().to_ascii_lowercase();
    IFRAME_DENYLIST.iter().any(|kw| lower.contains(kw)) || is_tracking(url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn protocol_relative_becomes_https() {
        assert_eq!(normalize_scheme("//host.example.com/x"), "https://host.example.com/x");
        assert_eq!(normalize_scheme("http://a/b"), "http://a/b");
        let base = url("http://site.example/page/");
        assert_eq!(
            absolutize("//cdn.example.com/a.mp4", &base).unwrap().as_str(),
            "https://cdn.example.com/a.mp4"
        );
    }

    #[test]
    fn relative_references_join_the_page_url() {
        let base = url("https://site.example/watch/ep1");
        assert_eq!(
            absolutize("/embed/9", &base).unwrap().as_str(),
            "https://site.example/embed/9"
        );
        assert_eq!(
            absolutize("v.m3u8", &base).unwrap().as_str(),
            "https://site.example/watch/v.m3u8"
        );
        assert!(absolutize("javascript:void(0)", &base).is_none());
        assert!(absolutize("#", &base).is_none());
    }

    #[test]
    fn escaped_slashes_are_unescaped() {
        assert_eq!(
            parse_absolute(r"https:\/\/cdn.example\/v.mp4").unwrap().as_str(),
            "https://cdn.example/v.mp4"
        );
        assert!(parse_absolute("/relative/only").is_none());
        assert!(parse_absolute("ftp://files.example/a.mp4").is_none());
    }

    #[test]
    fn assets_are_detected_by_path() {
        assert!(is_asset_url(&url("https://a.example/style.css")));
        assert!(is_asset_url(&url("https://a.example/poster.PNG?x=1")));
        assert!(is_asset_url(&url("https://a.example/wp-content/uploads/v")));
        assert!(!is_asset_url(&url("https://cdn.js.example/embed/abc")));
        assert!(!is_asset_url(&url("https://a.example/v.mp4?sig=a.css")));
    }

    #[test]
    fn upload_dirs_are_not_asset_files() {
        let upload = url("https://site.example/wp-content/uploads/2024/05/movie.mp4");
        assert!(in_asset_dir(&upload));
        assert!(!has_asset_extension(&upload));
        assert!(has_asset_extension(&url("https://cdn.example.com/posters/ep1.jpg")));
    }

    #[test]
    fn tracking_matches_tokens_not_substrings() {
        assert!(is_tracking("https://ads.example.com/v.mp4"));
        assert!(is_tracking("https://x.example/ad/video"));
        assert!(is_tracking("https://www.google-analytics.com/collect"));
        assert!(!is_tracking("https://cdn.example.com/uploads/video.mp4"));
        assert!(!is_tracking("https://cdn.example.com/downloads/a.m3u8"));
    }

    #[test]
    fn social_iframes_are_denied() {
        assert!(is_denied_iframe(&url("https://facebook.com/plugins/like.php")));
        assert!(is_denied_iframe(&url("https://www.youtube.com/channel/abc")));
        assert!(!is_denied_iframe(&url("https://host.example.com/embed/xyz")));
    }

    #[test]
    fn media_indicators() {
        assert!(has_media_extension(&url("https://c.example/a/b.M3U8")));
        assert!(!has_media_extension(&url("https://c.example/a.mp4/page")));
        assert!(has_video_indicator("https://dood.example/e/1"));
        assert!(!has_video_indicator("https://example.com/about"));
        assert!(has_data_media_indicator("https://x.example/stream/1"));
    }
}
