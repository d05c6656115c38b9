use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w-]").unwrap());
static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_WORD_OR_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

// Turns a title (or an already slugged string) into the site's URL slug
//
// "SPY x FAMILY"        -> "spy-x-family"
// "Your Name: Part 2!"  -> "your-name-part-2"
// "a-wild-last-boss"    -> "a-wild-last-boss"
pub fn normalize_slug(title: &str) -> String {
    let slug = title.trim().to_lowercase();
    let slug = SPACES.replace_all(&slug, "-");
    let slug = NON_SLUG.replace_all(&slug, "");
    let slug = DASHES.replace_all(&slug, "-");
    slug.trim_matches('-').to_string()
}

fn slug_after(url: &str, segment: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let marker = format!("/{}/", segment);
    let start = path.find(&marker)? + marker.len();
    let slug = path[start..].split('/').next()?;
    (!slug.is_empty()).then(|| slug.to_string())
}

/// `https://toonstream.one/series/spy-x-family/` -> `spy-x-family`
pub fn series_slug_from_url(url: &str) -> Option<String> {
    slug_after(url, "series")
}

/// `/movies/your-name/` -> `your-name`
pub fn movie_slug_from_url(url: &str) -> Option<String> {
    slug_after(url, "movies")
}

/// Accepts a URL, a slug or a free-form title and returns the slug.
pub fn slug_from_input(input: &str, from_url: fn(&str) -> Option<String>) -> String {
    let input = input.trim();
    if input.starts_with("http") || input.contains('/') {
        if let Some(slug) = from_url(input) {
            return slug;
        }
    }
    normalize_slug(input)
}

// "hindi-dubbed" -> "Hindi Dubbed"
pub fn deslug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Search terms keep letters, digits, underscores and spaces.
pub fn sanitize_term(term: &str) -> String {
    let cleaned = NON_WORD_OR_SPACE.replace_all(term.trim(), "");
    SPACES.replace_all(cleaned.trim(), " ").into_owned()
}

/// Path segments (genre, director, category) keep `[\w-]`.
pub fn sanitize_segment(segment: &str) -> String {
    NON_SLUG
        .replace_all(&segment.trim().to_lowercase().replace(' ', "-"), "")
        .into_owned()
}

pub fn extract_year(s: &str) -> Option<String> {
    YEAR.find(s).map(|m| m.as_str().to_string())
}

/// Collapsed text content of an element.
pub fn text_of(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text of a whole page, one trimmed text node per line. Script and
/// style bodies are left out.
pub fn page_text(document: &Html) -> String {
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(|p| p.value().as_element().map(|el| el.name()));
            if matches!(parent, Some("script" | "style" | "noscript")) {
                return None;
            }
            let text = text.trim();
            (!text.is_empty()).then_some(text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn non_empty(s: impl AsRef<str>) -> Option<String> {
    let s = s.as_ref().trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Image URLs hide behind lazy-loading attributes on both sites.
pub fn image_url(el: &ElementRef<'_>, base: &Url) -> Option<Url> {
    ["data-original", "data-src", "data-lazy-src", "src"]
        .iter()
        .filter_map(|attr| el.value().attr(attr))
        .filter(|v| !v.trim().is_empty() && !v.starts_with("data:"))
        .find_map(|v| crate::resolver::classify::absolutize(v, base))
}

/// `page` 1 lives at `{base}/{path}/`, later pages at `{base}/{path}/page/{n}/`.
pub fn paged(base: &Url, path: &str, page: u32) -> Option<Url> {
    let path = path.trim_matches('/');
    let rel = match (path.is_empty(), page) {
        (true, 0 | 1) => String::from("/"),
        (true, n) => format!("/page/{}/", n),
        (false, 0 | 1) => format!("/{}/", path),
        (false, n) => format!("/{}/page/{}/", path, n),
    };
    base.join(&rel).ok()
}
