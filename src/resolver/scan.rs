//! Generic scan of a fetched embed page. Produces the ordered list of
//! candidates the resolver walks when no provider pattern hit.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::Step;
use super::classify::{
    absolutize, has_data_media_indicator, has_media_extension,
    has_asset_extension, has_video_indicator, is_denied_iframe, is_tracking, parse_absolute,
};

static VIDEO: Lazy<Selector> = Lazy::new(|| Selector::parse("video").unwrap());
static SOURCE: Lazy<Selector> = Lazy::new(|| Selector::parse("source").unwrap());
static IFRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").unwrap());
static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static ANY: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

const URL: &str = r#"((?:https?:)?//[^"'\s]+)"#;

/// Script assignments that usually carry the stream. The URL is always the
/// last capture group.
static SCRIPT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let q = r#"["']"#;
    let assign = |name: &str| format!(r#"\b{name}{q}?\s*[:=]\s*{q}{URL}{q}"#);
    let mut patterns = vec![
        format!(r#"{q}((?:https?:)?//[^"'\s]+\.(?:mp4|m3u8|webm|mkv|flv)[^"'\s]*){q}"#),
        format!(r#"\bsrc{q}?\s*[:=]\s*{q}((?:https?:)?//[^"'\s]+\.(?:mp4|m3u8|webm|mkv)[^"'\s]*){q}"#),
    ];
    for name in [
        "file", "url", "video", "stream", "source", "fileurl", "video_url", "videoUrl",
    ] {
        patterns.push(assign(name));
    }
    patterns.extend([
        format!(r#"getElementById\(\s*{q}([^"']+){q}\s*\)\.src\s*=\s*{q}{URL}{q}"#),
        format!(r#"\.setAttribute\(\s*{q}src{q}\s*,\s*{q}{URL}{q}"#),
        format!(r#"iframe\.src\s*=\s*{q}{URL}{q}"#),
        format!(r#"player\.src\s*=\s*{q}{URL}{q}"#),
        format!(r#"sources{q}?\s*[:=]\s*\[\s*{q}((?:https?:)?//[^"'\s]+\.mp4[^"'\s]*){q}"#),
        format!(r#"jwplayer\(\s*{q}([^"']+){q}\s*\)\.setup\([^}}]+file{q}?\s*[:=]\s*{q}{URL}{q}"#),
    ]);
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
        .collect()
});

static REDIRECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)window\.location(?:\.href|\.replace)?\s*(?:=|\()\s*["']{URL}["']"#
    ))
    .unwrap()
});

pub type Strategy = fn(&Html, &Url) -> Vec<Step>;

/// Generic strategies in priority order.
pub static STRATEGIES: &[(&str, Strategy)] = &[
    ("video-tag", video_tags),
    ("iframe", iframes),
    ("script", script_assignments),
    ("data-attribute", data_attributes),
    ("m3u8-link", playlist_links),
    ("redirect", location_redirect),
];

pub fn plan(body: &str, base: &Url) -> Vec<(&'static str, Step)> {
    let document = Html::parse_document(body);
    STRATEGIES
        .iter()
        .flat_map(|(name, strategy)| strategy(&document, base).into_iter().map(move |s| (*name, s)))
        .collect()
}

fn attr<'a>(el: &ElementRef<'a>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| el.value().attr(name).filter(|v| !v.trim().is_empty()))
}

fn video_tags(document: &Html, base: &Url) -> Vec<Step> {
    let mut steps = Vec::new();
    for video in document.select(&VIDEO) {
        if let Some(url) = attr(&video, &["src", "data-src", "data-url"]).and_then(|s| absolutize(s, base)) {
            steps.push(Step::Found(url));
        }
        for source in video.select(&SOURCE) {
            let url = attr(&source, &["src", "data-src"]).and_then(|s| absolutize(s, base));
            if let Some(url) = url.filter(has_media_extension) {
                steps.push(Step::Found(url));
            }
        }
    }
    steps
}

fn iframes(document: &Html, base: &Url) -> Vec<Step> {
    document
        .select(&IFRAME)
        .filter_map(|el| attr(&el, &["src", "data-src", "data-url", "data-frame"]))
        .filter_map(|src| absolutize(src, base))
        .filter(|url| !is_denied_iframe(url))
        .map(Step::Follow)
        .collect()
}

fn script_texts(document: &Html) -> Vec<String> {
    document
        .select(&SCRIPT)
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

fn script_assignments(document: &Html, _base: &Url) -> Vec<Step> {
    let mut steps = Vec::new();
    for text in script_texts(document) {
        for pattern in SCRIPT_PATTERNS.iter() {
            for caps in pattern.captures_iter(&text) {
                let Some(raw) = caps.iter().flatten().last() else {
                    continue;
                };
                let Some(url) = parse_absolute(raw.as_str()) else {
                    continue;
                };
                if has_video_indicator(url.as_str())
                    && !is_tracking(url.as_str())
                    && !has_asset_extension(&url)
                {
                    steps.push(Step::Found(url));
                }
            }
        }
    }
    steps
}

fn data_attributes(document: &Html, _base: &Url) -> Vec<Step> {
    let mut steps = Vec::new();
    // iframes were already followed; an unresolved embed is not a direct link
    for el in document.select(&ANY).filter(|el| el.value().name() != "iframe") {
        for (name, value) in el.value().attrs() {
            if !name.starts_with("data-") {
                continue;
            }
            let Some(url) = parse_absolute(value) else {
                continue;
            };
            if has_data_media_indicator(url.as_str())
                && !is_tracking(url.as_str())
                && !has_asset_extension(&url)
            {
                steps.push(Step::Found(url));
            }
        }
    }
    steps
}

fn playlist_links(document: &Html, base: &Url) -> Vec<Step> {
    document
        .select(&LINK)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| absolutize(href, base))
        .filter(|url| url.path().to_ascii_lowercase().ends_with(".m3u8"))
        .map(Step::Found)
        .collect()
}

fn location_redirect(document: &Html, _base: &Url) -> Vec<Step> {
    script_texts(document)
        .iter()
        .flat_map(|text| REDIRECT.captures_iter(text).map(|caps| caps[1].to_string()).collect::<Vec<_>>())
        .filter_map(|raw| parse_absolute(&raw))
        .map(Step::Follow)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://embed.example/e/1").unwrap()
    }

    fn names_and_urls(body: &str) -> Vec<(&'static str, String)> {
        plan(body, &base())
            .into_iter()
            .map(|(name, step)| match step {
                Step::Found(u) => (name, format!("found {}", u)),
                Step::Follow(u) => (name, format!("follow {}", u)),
            })
            .collect()
    }

    #[test]
    fn video_source_with_media_extension() {
        let plan = names_and_urls(r#"<video><source src="https://cdn.example.com/a.mp4"></video>"#);
        assert_eq!(plan, [("video-tag", "found https://cdn.example.com/a.mp4".to_string())]);
    }

    #[test]
    fn source_without_media_extension_is_skipped() {
        let plan = names_and_urls(r#"<video><source src="https://cdn.example.com/page"></video>"#);
        assert!(plan.is_empty());
    }

    #[test]
    fn iframes_are_followed_unless_denied() {
        let plan = names_and_urls(
            r#"<iframe src="https://facebook.com/plugins/video.php"></iframe>
               <iframe data-src="//host.example.com/embed/xyz"></iframe>"#,
        );
        assert_eq!(plan, [("iframe", "follow https://host.example.com/embed/xyz".to_string())]);
    }

    #[test]
    fn script_file_assignment() {
        let plan = names_and_urls(r#"<script>jwplayer("p").setup({ file: "https://cdn2.example.com/b.m3u8" });</script>"#);
        assert_eq!(plan[0], ("script", "found https://cdn2.example.com/b.m3u8".to_string()));
    }

    #[test]
    fn script_values_must_look_like_media() {
        let plan = names_and_urls(
            r#"<script>var url = "https://example.com/about"; var src = "https://ads.example.com/v.mp4";
               var file = "https://cdn.example/player.js";</script>"#,
        );
        assert!(plan.is_empty(), "{:?}", plan);
    }

    #[test]
    fn script_media_under_uploads_is_kept() {
        let plan = names_and_urls(
            r#"<script>player.setup({ file: "https://site.example/wp-content/uploads/2024/05/movie.mp4" })</script>"#,
        );
        assert_eq!(
            plan[0],
            ("script", "found https://site.example/wp-content/uploads/2024/05/movie.mp4".to_string())
        );
    }

    #[test]
    fn set_attribute_call() {
        let plan = names_and_urls(r#"<script>el.setAttribute('src', '//stream.example/v/9');</script>"#);
        assert_eq!(plan, [("script", "found https://stream.example/v/9".to_string())]);
    }

    #[test]
    fn data_attribute_and_playlist_link() {
        let plan = names_and_urls(
            r#"<div data-video="https://media.example/x/stream/1"></div>
               <a href="/hls/master.m3u8">hls</a>"#,
        );
        assert_eq!(
            plan,
            [
                ("data-attribute", "found https://media.example/x/stream/1".to_string()),
                ("m3u8-link", "found https://embed.example/hls/master.m3u8".to_string()),
            ]
        );
    }

    #[test]
    fn poster_images_are_not_media() {
        let plan = names_and_urls(
            r#"<div class="player" data-poster="https://cdn.example.com/posters/ep1.jpg"
                    data-video="https://cdn.example.com/stream/ep1"></div>"#,
        );
        assert_eq!(plan, [("data-attribute", "found https://cdn.example.com/stream/ep1".to_string())]);
    }

    #[test]
    fn location_redirect_is_followed() {
        let plan = names_and_urls(r#"<script>window.location.replace("https://next.example/go")</script>"#);
        assert_eq!(plan, [("redirect", "follow https://next.example/go".to_string())]);
    }

    #[test]
    fn strategy_order_is_fixed() {
        let plan = names_and_urls(
            r#"<script>window.location.href = "https://next.example/go"</script>
               <iframe src="https://host.example/e/2"></iframe>
               <video src="https://cdn.example/v.mp4"></video>"#,
        );
        let names: Vec<_> = plan.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["video-tag", "iframe", "redirect"]);
    }
}
