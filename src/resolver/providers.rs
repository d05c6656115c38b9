//! Known video hosts. Each entry recognizes its URLs by substring and knows
//! where that host hides the playable link in its embed page.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::Step;
use super::classify::{absolutize, has_video_indicator, is_tracking, parse_absolute};

pub struct Provider {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub extract: fn(&str, &Url) -> Vec<Step>,
}

/// Checked in order; every matching provider gets a go at the shared body.
pub static PROVIDERS: &[Provider] = &[
    Provider {
        name: "doodstream",
        matches: is_dood,
        extract: dood,
    },
    Provider {
        name: "streamtape",
        matches: is_streamtape,
        extract: streamtape,
    },
    Provider {
        name: "mixdrop",
        matches: is_mixdrop,
        extract: mixdrop,
    },
    Provider {
        name: "vidstream",
        matches: is_vidstream,
        extract: vidstream,
    },
    Provider {
        name: "embed-proxy",
        matches: is_embed_proxy,
        extract: embed_proxy,
    },
];

pub fn matching(url: &str) -> impl Iterator<Item = &'static Provider> {
    let lower = url.to_ascii_lowercase();
    PROVIDERS.iter().filter(move |p| (p.matches)(&lower))
}

fn is_dood(url: &str) -> bool {
    url.contains("dood")
}

fn is_streamtape(url: &str) -> bool {
    url.contains("streamtape.com") || url.contains("streamtape.to")
}

fn is_mixdrop(url: &str) -> bool {
    url.contains("mixdrop")
}

fn is_vidstream(url: &str) -> bool {
    url.contains("vidstream") || url.contains("vidcloud")
}

fn is_embed_proxy(url: &str) -> bool {
    url.contains("trembed") || url.contains("/embed/")
}

static DOOD_PASS_MD5: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"var\s+pass_md5\s*=\s*["']([^"']+)["']"#).unwrap());
static DOOD_VIDEO_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"var\s+video_url\s*=\s*["']([^"']+)["']"#).unwrap());
static DOOD_FALLBACKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"["']((?:https?:)?//[^"']*dood[^"']*\.(?:mp4|m3u8)[^"']*)["']"#,
        r#"file["']?\s*[:=]\s*["']((?:https?:)?//[^"']+\.mp4[^"']*)["']"#,
        r#"sources["']?\s*[:=]\s*\[\s*["']((?:https?:)?//[^"']+\.mp4[^"']*)["']"#,
    ])
});

static STREAMTAPE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"get_video["']?\s*[:=]\s*["']((?:https?:)?//[^"']+)["']"#,
        r#"robotlink["']?\s*[:=]\s*["']((?:https?:)?//[^"']+)["']"#,
    ])
});

static MIXDROP: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"MDCore\.wurl\s*=\s*["']((?:https?:)?//[^"']+)["']"#,
        r#"sources["']?\s*[:=]\s*\[\s*["']((?:https?:)?//[^"']+\.mp4[^"']*)["']"#,
        r#"file["']?\s*[:=]\s*["']((?:https?:)?//[^"']+\.mp4[^"']*)["']"#,
    ])
});

static IFRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").unwrap());
static VIDEO: Lazy<Selector> = Lazy::new(|| Selector::parse("video").unwrap());

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
        .collect()
}

/// A provider hit has to look like media and must not be an ad beacon.
fn playable(url: Url) -> Option<Url> {
    (has_video_indicator(url.as_str()) && !is_tracking(url.as_str())).then_some(url)
}

fn first_match(patterns: &[Regex], body: &str) -> Option<Url> {
    patterns
        .iter()
        .filter_map(|re| re.captures(body))
        .filter_map(|caps| parse_absolute(&caps[1]))
        .find_map(playable)
}

fn dood(body: &str, _base: &Url) -> Vec<Step> {
    if DOOD_PASS_MD5.is_match(body) {
        let video = DOOD_VIDEO_URL
            .captures(body)
            .and_then(|caps| parse_absolute(&caps[1]))
            .filter(|url| {
                let lower = url.as_str().to_ascii_lowercase();
                [".mp4", ".m3u8", "stream", "video"]
                    .iter()
                    .any(|token| lower.contains(token))
            });
        if let Some(url) = video {
            return vec![Step::Found(url)];
        }
    }
    first_match(&DOOD_FALLBACKS, body)
        .map(Step::Found)
        .into_iter()
        .collect()
}

fn streamtape(body: &str, _base: &Url) -> Vec<Step> {
    first_match(&STREAMTAPE, body)
        .map(Step::Found)
        .into_iter()
        .collect()
}

fn mixdrop(body: &str, _base: &Url) -> Vec<Step> {
    first_match(&MIXDROP, body)
        .map(Step::Found)
        .into_iter()
        .collect()
}

fn vidstream(body: &str, base: &Url) -> Vec<Step> {
    let document = Html::parse_document(body);
    let mut steps = Vec::new();

    let iframe = document
        .select(&IFRAME)
        .next()
        .and_then(|el| el.value().attr("src"))
        .and_then(|src| absolutize(src, base));
    if let Some(url) = iframe {
        steps.push(Step::Follow(url));
    }

    let video = document
        .select(&VIDEO)
        .next()
        .and_then(|el| el.value().attr("src"))
        .and_then(|src| absolutize(src, base));
    if let Some(url) = video {
        steps.push(Step::Found(url));
    }
    steps
}

fn embed_proxy(body: &str, base: &Url) -> Vec<Step> {
    let document = Html::parse_document(body);
    document
        .select(&IFRAME)
        .next()
        .and_then(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
        .and_then(|src| absolutize(src, base))
        .map(Step::Follow)
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn found(steps: Vec<Step>) -> Option<String> {
        match steps.into_iter().next() {
            Some(Step::Found(url)) => Some(url.to_string()),
            _ => None,
        }
    }

    #[test]
    fn table_order_and_matching() {
        let names: Vec<_> = matching("https://Dood.watch/e/abc").map(|p| p.name).collect();
        assert_eq!(names, ["doodstream"]);
        let names: Vec<_> = matching("https://vidcloud.example/embed/1").map(|p| p.name).collect();
        assert_eq!(names, ["vidstream", "embed-proxy"]);
        assert_eq!(matching("https://cdn.example/a.mp4").count(), 0);
    }

    #[test]
    fn dood_prefers_video_url_with_pass_md5() {
        let body = r#"<script>var pass_md5 = "/pass/abc"; var video_url = "//dood.cdn/stream/abc.mp4";</script>"#;
        assert_eq!(
            found(dood(body, &base("https://dood.to/e/abc"))).as_deref(),
            Some("https://dood.cdn/stream/abc.mp4")
        );
    }

    #[test]
    fn dood_falls_back_to_file_assignment() {
        let body = r#"player.setup({file: "https://media.example/v/abc.mp4?t=1"})"#;
        assert_eq!(
            found(dood(body, &base("https://dood.to/e/abc"))).as_deref(),
            Some("https://media.example/v/abc.mp4?t=1")
        );
        assert!(dood("<p>nothing</p>", &base("https://dood.to/e/abc")).is_empty());
    }

    #[test]
    fn streamtape_get_video() {
        let body = r#"var conf = {get_video: "https://streamtape.com/get_video?id=9&token=x"};"#;
        assert_eq!(
            found(streamtape(body, &base("https://streamtape.com/e/9"))).as_deref(),
            Some("https://streamtape.com/get_video?id=9&token=x")
        );
    }

    #[test]
    fn mixdrop_wurl() {
        let body = r#"MDCore.wurl = "//s-delivery1.mxdcontent.net/v/abc.mp4?s=1";"#;
        assert_eq!(
            found(mixdrop(body, &base("https://mixdrop.co/e/abc"))).as_deref(),
            Some("https://s-delivery1.mxdcontent.net/v/abc.mp4?s=1")
        );
    }

    #[test]
    fn vidstream_follows_iframe_then_video() {
        let body = r#"<iframe src="/inner/1"></iframe><video src="https://cdn.example/x.mp4"></video>"#;
        let steps = vidstream(body, &base("https://vidstream.example/e/1"));
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], Step::Follow(u) if u.as_str() == "https://vidstream.example/inner/1"));
        assert!(matches!(&steps[1], Step::Found(u) if u.as_str() == "https://cdn.example/x.mp4"));
    }

    #[test]
    fn embed_proxy_uses_data_src() {
        let body = r#"<iframe data-src="//player.example/e/2"></iframe>"#;
        let steps = embed_proxy(body, &base("https://site.example/?trembed=1&trid=2"));
        assert!(matches!(&steps[..], [Step::Follow(u)] if u.as_str() == "https://player.example/e/2"));
    }
}
