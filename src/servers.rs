//! Streaming server discovery on episode and movie pages, and the hand-off
//! of embed servers to the resolver.

use std::collections::HashSet;

use futures::{StreamExt, stream};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::{ServerType, StreamingServer};
use crate::resolver::Resolver;
use crate::resolver::classify::{absolutize, is_asset_url, parse_absolute};
use crate::utils::text_of;

static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(Server\s*\d+)",
        r"(?i)(HD\s*Server)",
        r"(?i)(SD\s*Server)",
        r"(?i)\b(720p|1080p|480p|360p)\b",
        r"(?i)(DoodStream|Streamtape|Mixdrop|Vidstream|Gounlimited)",
        r"(?i)\b(Watch|Stream|Play|Download)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static QUALITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(720p|1080p|480p|360p|240p|4k|2160p)\b",
        r"(?i)\b(HD|SD|FHD|UHD)\b",
        r"(?i)\b(High|Medium|Low)\s*Quality\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static CLASS_SERVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"server[-\s]*(\d+|[a-z]+)").unwrap());
static SECTION_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Server\s*(\d+)").unwrap());
static SECTION_QUALITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:HD|SD|FHD|UHD|4K)?\s*\d{3,4}p").unwrap());
static SCRIPT_URL: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)["']((?:https?:)?//[^"'\s]*(?:stream|embed|player|watch|video|play|server|cdn|mp4|m3u8|webm|mkv|flv)[^"'\s]*)["']"#,
        r#"(?i)\b(?:url|src|file|video|source|fileurl|video_url|videoUrl)["']?\s*[:=]\s*["']((?:https?:)?//[^"'\s]+)["']"#,
        r#"(?i)\.setAttribute\(\s*["']src["']\s*,\s*["']((?:https?:)?//[^"'\s]+)["']"#,
        r#"(?i)iframe\.src\s*=\s*["']((?:https?:)?//[^"'\s]+)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static SERVER_SECTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[class*=server], section[class*=server], article[class*=server]").unwrap()
});
static SERVER_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "a[class*=server], a[class*=link], a[class*=watch], a[class*=download], \
         button[class*=server], button[class*=play], div[class*=player-option], \
         li[class*=server], li[class*=option], li[class*=tab], [data-embed], [data-video]",
    )
    .unwrap()
});
static PLAYER: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[class*=player], div[class*=video], div[class*=embed], section[class*=player]")
        .unwrap()
});
static IFRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").unwrap());
static VIDEO: Lazy<Selector> = Lazy::new(|| Selector::parse("video").unwrap());
static SOURCE: Lazy<Selector> = Lazy::new(|| Selector::parse("source").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());

const LINK_ATTRS: &[&str] = &["href", "data-url", "data-link", "data-src", "data-video", "data-embed", "data-server"];
const EXCLUDED: &[&str] = &[
    "login",
    "signup",
    "advert",
    "facebook",
    "twitter",
    "instagram",
    "analytics",
    "tracking",
    "youtube.com/channel",
    "wp-login",
    "mailto:",
];
const STREAM_HINTS: &[&str] = &[
    "stream", "embed", "player", "watch", "video", "play", "server", "cdn", "mp4", "m3u8", "dood",
    "streamtape", "mixdrop", "vidstream", "gounlimited",
];
const PLAYER_ATTRS: &[&str] = &["data-src", "data-url", "data-video", "data-embed", "data-frame"];
const PLAYER_WORDS: &[&str] = &["watch", "stream", "play", "server", "embed", "player"];
const ACTION_WORDS: &[&str] = &["download", "watch", "stream", "play", "hd", "720p", "1080p"];

/// Guesses the server type from the URL alone.
pub fn server_type(url: &str) -> ServerType {
    let lower = url.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(&["embed", "iframe"]) {
        ServerType::Embed
    } else if has(&[".mp4", ".m3u8", "direct", "cdn"]) {
        ServerType::Direct
    } else if lower.contains("drive.google") {
        ServerType::Gdrive
    } else if has(&["dood", "streamtape", "mixdrop"]) {
        ServerType::Filehost
    } else {
        ServerType::Iframe
    }
}

/// Quality label (uppercased) named in a link's text or URL.
pub fn extract_quality(text: &str, url: &str) -> Option<String> {
    let haystack = format!("{} {}", text, url);
    QUALITY_PATTERNS
        .iter()
        .find_map(|re| re.captures(&haystack))
        .map(|caps| caps[1].to_uppercase())
}

fn name_in(text: &str) -> Option<String> {
    NAME_PATTERNS
        .iter()
        .find_map(|re| re.captures(text))
        .map(|caps| caps[1].trim().to_string())
}

/// Label for a server link: its own text, then its parent's, then a
/// `server-*` class, else `default`.
pub fn server_name(el: &ElementRef<'_>, default: &str) -> String {
    if let Some(name) = name_in(&text_of(el)) {
        return name;
    }
    let parent_text = el.parent().and_then(ElementRef::wrap).map(|p| text_of(&p));
    if let Some(name) = parent_text.as_deref().and_then(name_in) {
        return name;
    }
    let classes = el.value().classes().collect::<Vec<_>>().join(" ").to_lowercase();
    if let Some(caps) = CLASS_SERVER.captures(&classes) {
        return format!("Server {}", crate::utils::deslug(&caps[1]));
    }
    default.to_string()
}

fn excluded(url: &Url) -> bool {
    let lower = url.as_str().to_lowercase();
    EXCLUDED.iter().any(|kw| lower.contains(kw)) || is_asset_url(url)
}

/// Gathers candidate servers from one page. URLs are deduplicated in
/// discovery order and numbered as they are accepted.
pub struct ServerCollector<'a> {
    base: &'a Url,
    page: Option<&'a Url>,
    seen: HashSet<String>,
    servers: Vec<StreamingServer>,
}

impl<'a> ServerCollector<'a> {
    pub fn new(base: &'a Url) -> Self {
        Self {
            base,
            page: None,
            seen: HashSet::new(),
            servers: Vec::new(),
        }
    }

    /// The page being scanned never counts as one of its own servers.
    pub fn skipping(mut self, page: &'a Url) -> Self {
        self.page = Some(page);
        self
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    fn next_number(&self) -> usize {
        self.servers.len() + 1
    }

    fn accept(&mut self, raw: &str) -> Option<Url> {
        let url = absolutize(raw, self.base)?;
        if excluded(&url) || self.page.is_some_and(|page| page == &url) {
            return None;
        }
        self.seen.insert(url.to_string()).then_some(url)
    }

    /// Adds one server; returns whether it was new.
    pub fn push(
        &mut self,
        raw: &str,
        name: impl FnOnce(usize) -> String,
        quality: Option<String>,
        kind: Option<ServerType>,
    ) -> bool {
        let number = self.next_number();
        let Some(url) = self.accept(raw) else {
            return false;
        };
        let quality = quality.or_else(|| extract_quality("", url.as_str()));
        let kind = kind.unwrap_or_else(|| server_type(url.as_str()));
        self.servers.push(StreamingServer {
            name: name(number),
            url,
            quality,
            kind,
        });
        true
    }

    /// Runs every discovery pass over `document`.
    pub fn scan(&mut self, document: &Html) {
        self.server_sections(document);
        self.server_links(document);
        self.players(document);
        self.iframes(document);
        self.scripts(document);
        if self.len() < 3 {
            self.keyword_links(document);
        }
    }

    pub fn finish(self) -> Vec<StreamingServer> {
        self.servers
    }

    // "Server 1 ... HD 1080p ... [Watch]" blocks
    pub fn server_sections(&mut self, document: &Html) {
        for section in document.select(&SERVER_SECTION) {
            let text = text_of(&section);
            let number = SECTION_NUMBER.captures(&text).map(|c| c[1].to_string());
            let quality = SECTION_QUALITY
                .find(&text)
                .map(|m| m.as_str().trim().to_string());
            for link in section.select(&ANCHOR) {
                let link_text = text_of(&link).to_lowercase();
                if !ACTION_WORDS.iter().any(|w| link_text.contains(w)) {
                    continue;
                }
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                let quality = quality.clone().or_else(|| extract_quality(&link_text, href));
                let number = number.clone();
                self.push(
                    href,
                    |n| format!("Server {}", number.unwrap_or_else(|| n.to_string())),
                    quality,
                    None,
                );
            }
        }
    }

    // Classed server buttons, tabs and links, including data-* targets
    pub fn server_links(&mut self, document: &Html) {
        for el in document.select(&SERVER_LINK) {
            let target = LINK_ATTRS
                .iter()
                .find_map(|attr| el.value().attr(attr))
                .map(str::to_string)
                .or_else(|| {
                    el.select(&ANCHOR)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                        .map(str::to_string)
                });
            let Some(target) = target else {
                continue;
            };
            let lower = target.to_lowercase();
            let streaming = STREAM_HINTS.iter().any(|h| lower.contains(h))
                || lower.contains("episode")
                || lower.contains("movie");
            if !streaming {
                continue;
            }
            let text = text_of(&el);
            let quality = extract_quality(&text, &target);
            self.push(
                &target,
                |n| server_name(&el, &format!("Server {}", n)),
                quality,
                None,
            );
        }
    }

    // Player containers: data-* targets, iframes, <video>/<source> and
    // stream-looking links inside them
    pub fn players(&mut self, document: &Html) {
        for container in document.select(&PLAYER) {
            for attr in PLAYER_ATTRS {
                if let Some(target) = container.value().attr(attr) {
                    self.push(target, |n| format!("Data {}", n), None, None);
                }
            }
            for iframe in container.select(&IFRAME) {
                if let Some(src) = iframe.value().attr("src").or_else(|| iframe.value().attr("data-src")) {
                    self.push(src, |n| format!("Embed {}", n), None, None);
                }
            }
            for video in container.select(&VIDEO) {
                if let Some(src) = video.value().attr("src") {
                    self.push(src, |n| format!("Direct {}", n), None, Some(ServerType::Direct));
                }
                for source in video.select(&SOURCE) {
                    if let Some(src) = source.value().attr("src") {
                        let label = source.value().attr("label").map(str::to_string);
                        self.push(src, |n| format!("Direct {}", n), label, Some(ServerType::Direct));
                    }
                }
            }
            for link in container.select(&ANCHOR) {
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                let text = text_of(&link).to_lowercase();
                let lower = href.to_lowercase();
                if PLAYER_WORDS.iter().any(|w| text.contains(w) || lower.contains(w)) {
                    let quality = extract_quality(&text, href);
                    self.push(href, |n| server_name(&link, &format!("Server {}", n)), quality, None);
                }
            }
        }
    }

    pub fn iframes(&mut self, document: &Html) {
        for iframe in document.select(&IFRAME) {
            let src = ["src", "data-src", "data-lazy-src"]
                .iter()
                .find_map(|attr| iframe.value().attr(attr));
            if let Some(src) = src {
                self.push(src, |n| format!("Embed {}", n), None, None);
            }
        }
    }

    pub fn scripts(&mut self, document: &Html) {
        let texts: Vec<String> = document
            .select(&SCRIPT)
            .map(|s| s.text().collect())
            .collect();
        for text in texts {
            for re in SCRIPT_URL.iter() {
                for caps in re.captures_iter(&text) {
                    let Some(url) = parse_absolute(&caps[1]) else {
                        continue;
                    };
                    let lower = url.as_str().to_lowercase();
                    if STREAM_HINTS.iter().any(|h| lower.contains(h)) {
                        self.push(url.as_str(), |n| format!("Script {}", n), None, None);
                    }
                }
            }
        }
    }

    // Last resort: any link whose text or target smells like a stream
    pub fn keyword_links(&mut self, document: &Html) {
        for link in document.select(&ANCHOR) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let text = text_of(&link).to_lowercase();
            let lower = href.to_lowercase();
            let hinted = STREAM_HINTS
                .iter()
                .chain(["download"].iter())
                .any(|kw| text.contains(kw) || lower.contains(kw));
            if hinted {
                let quality = extract_quality(&text, href);
                self.push(href, |n| server_name(&link, &format!("Server {}", n)), quality, None);
            }
        }
    }
}

/// Collects the servers found on one page.
pub fn collect(document: &Html, base: &Url, page: &Url) -> Vec<StreamingServer> {
    let mut collector = ServerCollector::new(base).skipping(page);
    collector.scan(document);
    collector.finish()
}

fn wants_resolution(server: &StreamingServer) -> bool {
    server.kind.needs_resolution() || server.url.as_str().to_lowercase().contains("embed")
}

/// Swaps every embed-like server for its direct URL when the resolver finds
/// one. Order is preserved and failures keep the original entry.
pub async fn resolve_servers(
    resolver: &Resolver,
    servers: Vec<StreamingServer>,
    depth: u32,
    concurrency: usize,
) -> Vec<StreamingServer> {
    stream::iter(servers.into_iter().map(|server| async move {
        if !wants_resolution(&server) {
            return server;
        }
        match resolver.resolve_url(&server.url, depth).await {
            Some(direct) if direct != server.url => {
                debug!(name = %server.name, %direct, "server resolved to a direct link");
                server.resolved(direct)
            }
            _ => server,
        }
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http::testing::FakeFetcher;

    fn base() -> Url {
        Url::parse("https://site.example").unwrap()
    }

    #[test]
    fn types_follow_url_shape() {
        assert_eq!(server_type("https://a.example/embed/1"), ServerType::Embed);
        assert_eq!(server_type("https://cdn.example/v.m3u8"), ServerType::Direct);
        assert_eq!(server_type("https://drive.google.com/file/d/1"), ServerType::Gdrive);
        assert_eq!(server_type("https://dood.to/d/abc"), ServerType::Filehost);
        assert_eq!(server_type("https://other.example/v/1"), ServerType::Iframe);
    }

    #[test]
    fn quality_labels() {
        assert_eq!(extract_quality("Watch 1080p", "").as_deref(), Some("1080P"));
        assert_eq!(extract_quality("", "https://x.example/hd/1").as_deref(), Some("HD"));
        assert_eq!(extract_quality("High Quality", "").as_deref(), Some("HIGH"));
        assert_eq!(extract_quality("Server 1", "https://x.example/v"), None);
    }

    #[test]
    fn names_from_text_parent_or_class() {
        let html = Html::parse_fragment(
            r#"<ul><li>Mixdrop mirror <a id="a" href="/x">go</a></li>
               <li><a id="b" class="btn server-two" href="/y">?</a></li>
               <li><a id="c" href="/z">Server 3</a></li></ul>"#,
        );
        let pick = |id: &str| {
            let sel = Selector::parse(&format!("#{}", id)).unwrap();
            server_name(&html.select(&sel).next().unwrap(), "Fallback")
        };
        assert_eq!(pick("a"), "Mixdrop");
        assert_eq!(pick("b"), "Server Two");
        assert_eq!(pick("c"), "Server 3");
    }

    #[test]
    fn collects_and_deduplicates_servers() {
        let page = Url::parse("https://site.example/episode/show-1x1/").unwrap();
        let html = Html::parse_document(
            r#"<div class="player-box"><iframe src="//player.example/embed/abc"></iframe></div>
               <ul><li class="server-item" data-url="https://dood.to/e/xyz">Server 2 HD</li></ul>
               <iframe src="https://player.example/embed/abc"></iframe>
               <iframe src="https://facebook.com/plugins/page.php"></iframe>
               <a href="/wp-content/themes/x/style.css">css</a>"#,
        );
        let servers = collect(&html, &base(), &page);
        let urls: Vec<_> = servers.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, ["https://dood.to/e/xyz", "https://player.example/embed/abc"]);
        assert_eq!(servers[0].name, "Server 2");
        assert_eq!(servers[0].quality.as_deref(), Some("HD"));
        assert_eq!(servers[1].name, "Embed 2");
        assert_eq!(servers[1].kind, ServerType::Embed);
    }

    #[tokio::test]
    async fn embed_servers_become_direct_when_resolved() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://player.example/embed/abc",
            r#"<video src="https://cdn.example/abc.mp4"></video>"#,
        ));
        let resolver = Resolver::new(fetcher.clone());
        let servers = vec![
            StreamingServer {
                name: "Embed 1".into(),
                url: Url::parse("https://player.example/embed/abc").unwrap(),
                quality: None,
                kind: ServerType::Embed,
            },
            StreamingServer {
                name: "Embed 2".into(),
                url: Url::parse("https://player.example/embed/missing").unwrap(),
                quality: None,
                kind: ServerType::Embed,
            },
            StreamingServer {
                name: "Drive".into(),
                url: Url::parse("https://drive.google.com/file/d/1").unwrap(),
                quality: None,
                kind: ServerType::Gdrive,
            },
        ];
        let out = resolve_servers(&resolver, servers, 2, 5).await;
        assert_eq!(out[0].url.as_str(), "https://cdn.example/abc.mp4");
        assert_eq!(out[0].kind, ServerType::Direct);
        assert_eq!(out[0].name, "Embed 1");
        assert_eq!(out[1].kind, ServerType::Embed);
        assert_eq!(out[2].kind, ServerType::Gdrive);
        assert_eq!(fetcher.hits(), 2);
    }
}
