//! Anime listings, series, episodes and movies from the toonstream site.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CANDIDATE_DEPTH, EPISODE_DEPTH, MOVIE_DEPTH, Settings};
use crate::error::{Result, ScrapeError};
use crate::http::{Fetcher, Page};
use crate::models::{
    Anime, AnimeEpisode, AnimeSeriesDetail, Episode, Language, MovieDetail, ServerType, StreamingServer,
};
use crate::resolver::Resolver;
use crate::resolver::classify::absolutize;
use crate::servers::{self, ServerCollector};
use crate::utils::{
    deslug, extract_year, image_url, movie_slug_from_url, non_empty, normalize_slug, page_text, paged,
    series_slug_from_url, slug_from_input, text_of,
};

const EPISODE_SERVER_CONCURRENCY: usize = 10;

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static CARD_EXACT: Lazy<Selector> = Lazy::new(|| sel("article.post.dfx.fcl.movies"));
static CARD_ARTICLE: Lazy<Selector> = Lazy::new(|| sel("article[class*=post], article[class*=movies]"));
static CARD_DIV: Lazy<Selector> = Lazy::new(|| sel("div[class*=post], div[class*=movie], div[class*=anime]"));
static CARD_ANY: Lazy<Selector> = Lazy::new(|| sel("article[class], div[class]"));
static H2: Lazy<Selector> = Lazy::new(|| sel("h2"));
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| sel("h2.entry-title, h2, h3"));
static VOTE: Lazy<Selector> = Lazy::new(|| sel("span.vote, span[class*=vote]"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static LINK: Lazy<Selector> = Lazy::new(|| sel("a[href]"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| sel("a"));
static BLOCK_LINK: Lazy<Selector> = Lazy::new(|| sel("a.lnk-blk[href]"));
static CARD_DESC: Lazy<Selector> = Lazy::new(|| sel("p[class*=desc], div[class*=excerpt]"));
static GENRE_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*=genre]"));
static CARD_YEAR: Lazy<Selector> = Lazy::new(|| sel("span.release-year, div.year"));

static H1: Lazy<Selector> = Lazy::new(|| sel("h1"));
static EPISODE_HEADING: Lazy<Selector> = Lazy::new(|| sel("h1.entry-title, h1, h2.entry-title"));
static POSTER: Lazy<Selector> = Lazy::new(|| sel("img[class*=poster], img[class*=thumb]"));
static EPISODE_IMAGE: Lazy<Selector> =
    Lazy::new(|| sel("img[class*=poster], img[class*=thumb], img[class*=episode]"));
static CONTENT_AREA: Lazy<Selector> = Lazy::new(|| sel("div.entry-content, article, main"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| sel("p"));
static DESC_BLOCK: Lazy<Selector> =
    Lazy::new(|| sel("div[class*=desc], div[class*=content], div[class*=synopsis]"));
static ENTRY_CONTENT: Lazy<Selector> = Lazy::new(|| sel("div.entry-content, div[class*=content]"));
static META_DESC: Lazy<Selector> =
    Lazy::new(|| sel(r#"meta[property="og:description"], meta[name=description]"#));
static LANGUAGE_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*=language]"));
static CAST_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*=cast]"));
static SERIES_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*='/series/']"));
static PAGE_TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
static DURATION_SPAN: Lazy<Selector> = Lazy::new(|| sel("span[class*=duration]"));
static EPISODE_ITEM: Lazy<Selector> =
    Lazy::new(|| sel("div[class*=episode], li[class*=episode], article[class*=episode]"));
static EPISODE_TITLE: Lazy<Selector> = Lazy::new(|| sel("h2, h3, h4, a"));

static VIEW_LINK: Lazy<Regex> = Lazy::new(|| re(r"(?i)View\s+(Movie|Serie)"));
static NUMBER: Lazy<Regex> = Lazy::new(|| re(r"(\d+\.?\d*)"));
static TMDB: Lazy<Regex> = Lazy::new(|| re(r"(?i)TMDB[:\s]*(\d+\.?\d*)"));
static LANGUAGE_LINE: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)Language[:\s]*(.+?)(?:\n|Quality|Running|Duration|Cast|TMDB|Director|$)"));
static QUALITY_LINE: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)Quality[:\s]*(.+?)(?:\n|Running|Cast|TMDB|Director|$)"));
static DIRECTOR_LINE: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)Director[:\s]*(.+?)(?:\n|Cast|TMDB|Quality|Running|$)"));
static CAST_LINE: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bCast[:\s]*(.+)"));
static RUNTIME: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)(?:Running time|Duration)[:\s]*(\d+\s*(?:h|hours?)?\s*\d*\s*(?:min|minutes?|mins?)?)")
});
static BARE_RUNTIME: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)(\d+\s*(?:h|hours?)?\s*\d*\s*(?:min|minutes?|mins?))\b"));
static SEASONS: Lazy<Regex> = Lazy::new(|| re(r"(?i)(\d+)\s*Seasons?\b"));
static EPISODES: Lazy<Regex> = Lazy::new(|| re(r"(?i)(\d+)\s*Episodes?\b"));
static GENRE_WORDS: Lazy<Regex> = Lazy::new(|| {
    re(r"(Action|Adventure|Animation|Anime|Comedy|Crime|Drama|Family|Fantasy|Horror|Kids|Martial|Mystery|Romance|Sci-Fi|Superhero|Thriller|War)[\w &,]*")
});
static LANGUAGE_SPLIT: Lazy<Regex> = Lazy::new(|| re(r"[–-]"));
static EPISODE_HREF: Lazy<Regex> = Lazy::new(|| re(r"(?i)/episode/|-\d+x\d+"));
static SXE_IN_URL: Lazy<Regex> = Lazy::new(|| re(r"-(\d+)x(\d+)"));
static EPISODE_TEXT: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        re(r"(\d+)[xX](\d+)"),
        re(r"(?i)\bS(\d+)\s*E(\d+)\b"),
        re(r"(?i)Season\s*(\d+)\s*Episode\s*(\d+)"),
    ]
});
static EP_ONLY: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bEp\.?\s*(\d+)"));
static EPISODE_LABEL: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\d+x\d+\s*|\bS\d+\s*E\d+\s*|Season\s*\d+\s*Episode\s*\d+\s*"));
static AIRED: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        re(r"(?i)(\d+\s*(?:months?|days?|weeks?|years?)\s*ago)"),
        re(r"(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})"),
        re(r"(\d{4}-\d{2}-\d{2})"),
    ]
});
static SERIES_IN_TITLE: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)(.+?)\s*[-–]\s*(?:Episode|S\d+E\d+|\d+x\d+)"));
static MOVIE_IN_URL: Lazy<Regex> = Lazy::new(|| re(r"/movies?/([^/?#]+)"));

// Movie page candidates worth keeping even when unresolved
const VIDEO_HINTS: &[&str] = &[
    "mp4", "m3u8", "stream", "cdn", "video", "watch", "player", "drive.google", "dood", "vid", "upload",
];

/// `?type=` filter on category listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimeKind {
    Movies,
    Series,
}

impl AnimeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnimeKind::Movies => "movies",
            AnimeKind::Series => "series",
        }
    }
}

fn first_text(scope: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().map(|el| text_of(&el)).and_then(non_empty)
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|c| non_empty(&c[1]))
}

fn card_elements(document: &Html) -> Vec<ElementRef<'_>> {
    for selector in [&*CARD_EXACT, &*CARD_ARTICLE, &*CARD_DIV] {
        let found: Vec<_> = document.select(selector).collect();
        if !found.is_empty() {
            return found;
        }
    }
    document
        .select(&CARD_ANY)
        .filter(|el| el.select(&H2).next().is_some() && el.select(&ANY_LINK).next().is_some())
        .collect()
}

fn card_rating(card: &ElementRef<'_>) -> Option<String> {
    card.select(&VOTE)
        .next()
        .and_then(|vote| {
            let text = text_of(&vote).replace("TMDB", "");
            capture(&NUMBER, &text)
        })
        .or_else(|| capture(&TMDB, &text_of(card)))
}

fn card_url(card: &ElementRef<'_>, base: &Url) -> Option<Url> {
    let link = card
        .select(&LINK)
        .find(|a| VIEW_LINK.is_match(&text_of(a)))
        .or_else(|| card.select(&BLOCK_LINK).next())
        .or_else(|| card.select(&LINK).next())?;
    let url = absolutize(link.value().attr("href")?, base)?;
    match series_slug_from_url(url.as_str()) {
        Some(slug) => base.join(&format!("/series/{}/", slug)).ok(),
        None => Some(url),
    }
}

fn parse_card(card: ElementRef<'_>, base: &Url) -> Option<Anime> {
    let title = first_text(&card, &CARD_TITLE).or_else(|| {
        let link = card.select(&ANY_LINK).next()?;
        ["title", "alt"]
            .iter()
            .find_map(|attr| link.value().attr(attr).and_then(non_empty))
            .or_else(|| non_empty(text_of(&link)))
    })?;
    let Some(url) = card_url(&card, base) else {
        debug!(%title, "skipping card without a link");
        return None;
    };
    let genres = card
        .select(&GENRE_LINK)
        .map(|a| text_of(&a))
        .filter(|g| !g.is_empty())
        .collect();
    Some(Anime {
        language: Language::detect(&title).map(|l| l.as_str().to_string()),
        title,
        url,
        image: card.select(&IMG).next().and_then(|img| image_url(&img, base)),
        description: first_text(&card, &CARD_DESC),
        genres,
        year: first_text(&card, &CARD_YEAR),
        rating: card_rating(&card),
    })
}

/// Anime/movie cards on a listing or search page, first occurrence of each
/// URL kept.
pub fn parse_cards(body: &str, base: &Url) -> Vec<Anime> {
    let document = Html::parse_document(body);
    let mut seen = HashSet::new();
    card_elements(&document)
        .into_iter()
        .filter_map(|card| parse_card(card, base))
        .filter(|anime| seen.insert(anime.url.to_string()))
        .collect()
}

// Labelled metadata shared by series and movie pages
#[derive(Debug, Default)]
struct Metadata {
    description: Option<String>,
    genres: Vec<String>,
    languages: Vec<String>,
    year: Option<String>,
    rating: Option<String>,
    quality: Option<String>,
    duration: Option<String>,
    director: Option<String>,
    cast: Vec<String>,
}

fn long_paragraph(document: &Html) -> Option<String> {
    let readable = |text: &str| {
        let lower = text.to_lowercase();
        text.len() > 100 && !lower.contains("menu") && !lower.contains("navigation")
    };
    document
        .select(&PARAGRAPH)
        .map(|p| text_of(&p))
        .find(|text| readable(text))
        .or_else(|| {
            document
                .select(&DESC_BLOCK)
                .map(|d| text_of(&d))
                .find(|text| readable(text))
        })
}

fn meta_description(document: &Html) -> Option<String> {
    document
        .select(&META_DESC)
        .next()
        .and_then(|m| m.value().attr("content"))
        .and_then(non_empty)
}

fn metadata(document: &Html) -> Metadata {
    let text = page_text(document);

    let mut seen = HashSet::new();
    let mut genres: Vec<String> = document
        .select(&GENRE_LINK)
        .map(|a| text_of(&a))
        .filter(|g| !g.is_empty() && seen.insert(g.clone()))
        .collect();
    if genres.is_empty() {
        if let Some(found) = GENRE_WORDS.find(&text) {
            genres = found
                .as_str()
                .split([',', '&'])
                .filter_map(non_empty)
                .collect();
        }
    }
    genres.truncate(10);

    let mut languages: Vec<String> = match capture(&LANGUAGE_LINE, &text) {
        Some(line) => LANGUAGE_SPLIT.split(&line).filter_map(non_empty).collect(),
        None => document
            .select(&LANGUAGE_LINK)
            .map(|a| text_of(&a))
            .filter(|l| !l.is_empty())
            .collect(),
    };
    languages.truncate(5);

    let mut cast: Vec<String> = document
        .select(&CAST_LINK)
        .map(|a| text_of(&a))
        .filter(|c| !c.is_empty())
        .collect();
    if cast.is_empty() {
        if let Some(line) = capture(&CAST_LINE, &text) {
            cast = line
                .split(',')
                .filter_map(non_empty)
                .filter(|c| c.len() > 2)
                .collect();
        }
    }
    cast.truncate(10);

    Metadata {
        description: long_paragraph(document),
        genres,
        languages,
        year: extract_year(&text),
        rating: capture(&TMDB, &text),
        quality: capture(&QUALITY_LINE, &text),
        duration: capture(&RUNTIME, &text),
        director: capture(&DIRECTOR_LINE, &text),
        cast,
    }
}

fn episode_numbers(item: &ElementRef<'_>, url: &Url) -> Option<(u32, u32)> {
    let parse = |caps: regex::Captures<'_>| -> Option<(u32, u32)> {
        Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
    };
    if let Some(found) = SXE_IN_URL.captures(url.path()).and_then(parse) {
        return Some(found);
    }
    let text = text_of(item);
    EPISODE_TEXT
        .iter()
        .find_map(|re| re.captures(&text).and_then(parse))
        .or_else(|| {
            EP_ONLY
                .captures(&text)
                .and_then(|c| c[1].parse().ok())
                .map(|ep| (1, ep))
        })
}

fn episode_items(document: &Html) -> Vec<ElementRef<'_>> {
    let mut items: Vec<ElementRef> = document.select(&EPISODE_ITEM).collect();
    if items.is_empty() {
        let mut seen = HashSet::new();
        for link in document.select(&LINK) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !EPISODE_HREF.is_match(href) {
                continue;
            }
            let parent = link
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| matches!(el.value().name(), "div" | "li" | "article" | "section"));
            if let Some(parent) = parent {
                if seen.insert(parent.id()) {
                    items.push(parent);
                }
            }
        }
    }
    // wrappers around several episodes are not episodes themselves
    let ids: HashSet<_> = items.iter().map(|el| el.id()).collect();
    items
        .into_iter()
        .filter(|item| !item.descendants().skip(1).any(|node| ids.contains(&node.id())))
        .collect()
}

fn parse_anime_episode(item: ElementRef<'_>, base: &Url, series_title: &str) -> Option<AnimeEpisode> {
    let url = absolutize(item.select(&LINK).next()?.value().attr("href")?, base)?;
    let (season, episode_number) = episode_numbers(&item, &url)?;

    let raw_title = first_text(&item, &EPISODE_TITLE).unwrap_or_default();
    let cleaned = EPISODE_LABEL.replace_all(&raw_title, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = if cleaned.len() < 3 || cleaned.eq_ignore_ascii_case(series_title) {
        format!("Episode {}", episode_number)
    } else {
        cleaned
    };

    let text = text_of(&item);
    let aired_date = AIRED.iter().find_map(|re| capture(re, &text));
    Some(AnimeEpisode {
        title,
        url,
        season,
        episode_number,
        image: item.select(&IMG).next().and_then(|img| image_url(&img, base)),
        aired_date,
        servers: Vec::new(),
    })
}

fn page_image(document: &Html, base: &Url) -> Option<Url> {
    document
        .select(&POSTER)
        .chain(document.select(&IMG))
        .find_map(|img| image_url(&img, base))
}

/// Series page; `None` when the page has no `h1`.
pub fn parse_anime_series_detail(body: &str, base: &Url, url: Url) -> Option<AnimeSeriesDetail> {
    let document = Html::parse_document(body);
    let title = document.select(&H1).next().map(|h| text_of(&h)).and_then(non_empty)?;
    let meta = metadata(&document);
    let text = page_text(&document);

    let mut seen = HashSet::new();
    let mut episodes: Vec<AnimeEpisode> = episode_items(&document)
        .into_iter()
        .filter_map(|item| parse_anime_episode(item, base, &title))
        .filter(|ep| seen.insert(ep.url.to_string()))
        .collect();
    episodes.sort_by_key(|ep| (ep.season, ep.episode_number));

    Some(AnimeSeriesDetail {
        image: page_image(&document, base),
        description: meta.description,
        genres: meta.genres,
        languages: meta.languages,
        year: meta.year,
        rating: meta.rating,
        quality: meta.quality,
        duration: meta.duration,
        seasons: capture(&SEASONS, &text),
        episodes_count: capture(&EPISODES, &text),
        cast: meta.cast,
        title,
        url,
        episodes,
    })
}

fn episode_description(document: &Html) -> Option<String> {
    let from_content = document.select(&ENTRY_CONTENT).next().and_then(|content| {
        let paragraphs: Vec<String> = content
            .select(&PARAGRAPH)
            .map(|p| text_of(&p))
            .filter(|t| {
                let lower = t.to_lowercase();
                t.len() > 50 && !lower.contains("menu") && !lower.contains("navigation")
            })
            .take(3)
            .collect();
        non_empty(paragraphs.join(" "))
    });
    from_content.or_else(|| meta_description(document))
}

/// Episode page with its servers still unresolved.
pub fn parse_anime_episode_page(page: &Page, base: &Url, slug: &str, season: u32, episode: u32) -> Episode {
    let document = Html::parse_document(&page.body);
    let root = document.root_element();

    let title = first_text(&root, &EPISODE_HEADING)
        .unwrap_or_else(|| format!("{} S{:02}E{:02}", deslug(slug), season, episode));
    let series_title = first_text(&root, &SERIES_LINK)
        .or_else(|| {
            let page_title = first_text(&root, &PAGE_TITLE)?;
            capture(&SERIES_IN_TITLE, &page_title)
        })
        .unwrap_or_else(|| deslug(slug));
    let description = episode_description(&document);
    let image = document
        .select(&EPISODE_IMAGE)
        .next()
        .or_else(|| {
            document
                .select(&CONTENT_AREA)
                .next()
                .and_then(|area| area.select(&IMG).next())
        })
        .and_then(|img| image_url(&img, base));

    let text = page_text(&document);
    let duration = capture(&BARE_RUNTIME, &text).or_else(|| first_text(&root, &DURATION_SPAN));
    let language = capture(&LANGUAGE_LINE, &text)
        .and_then(|line| Language::detect(&line))
        .or_else(|| Language::detect(&format!("{} {}", title, description.as_deref().unwrap_or(""))))
        .unwrap_or(Language::English);

    let servers = servers::collect(&document, base, &page.url);
    Episode {
        title,
        url: page.url.clone(),
        series_title,
        season,
        episode_number: episode,
        description,
        image,
        streaming_links: servers.iter().map(|s| s.url.clone()).collect(),
        servers,
        duration,
        language: Some(language.as_str().to_string()),
    }
}

fn movie_candidates(document: &Html, base: &Url, page: &Url) -> Vec<StreamingServer> {
    let mut collector = ServerCollector::new(base).skipping(page);
    collector.keyword_links(document);
    collector.iframes(document);
    collector.players(document);
    collector.scripts(document);
    collector
        .finish()
        .into_iter()
        .filter(|s| !s.url.as_str().contains("wp-json"))
        .collect()
}

fn is_trembed(url: &Url) -> bool {
    let s = url.as_str();
    s.contains("trembed=") || s.contains("/embed/")
}

/// Movie page metadata plus its unresolved candidate servers.
pub fn parse_movie_page(page: &Page, base: &Url, slug: &str) -> MovieDetail {
    let document = Html::parse_document(&page.body);
    let meta = metadata(&document);
    let title = document
        .select(&EPISODE_HEADING)
        .next()
        .map(|h| text_of(&h))
        .and_then(non_empty)
        .unwrap_or_else(|| deslug(slug));
    let duration = meta.duration.or_else(|| capture(&BARE_RUNTIME, &page_text(&document)));
    let servers = movie_candidates(&document, base, &page.url);

    MovieDetail {
        title,
        url: page.url.clone(),
        image: page_image(&document, base),
        description: meta.description.or_else(|| meta_description(&document)),
        genres: meta.genres,
        languages: meta.languages,
        year: meta.year,
        rating: meta.rating,
        quality: meta.quality,
        duration,
        director: meta.director,
        cast: meta.cast,
        streaming_links: servers.iter().map(|s| s.url.clone()).collect(),
        servers,
    }
}

/// Scraper for the toonstream anime site.
#[derive(Clone)]
pub struct Toonstream {
    fetcher: Arc<dyn Fetcher>,
    resolver: Resolver,
    base: Url,
    concurrency: usize,
}

impl Toonstream {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: &Settings) -> Self {
        Self {
            resolver: Resolver::new(fetcher.clone()),
            fetcher,
            base: settings.toonstream_url.clone(),
            concurrency: settings.resolve_concurrency,
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ScrapeError::bad_request(format!("invalid path {}: {}", path, e)))
    }

    async fn fetch(&self, url: &Url) -> Result<Page> {
        info!(%url, "scraping");
        Ok(self.fetcher.get(url).await?)
    }

    async fn cards(&self, url: &Url, what: String) -> Result<Vec<Anime>> {
        let page = self.fetch(url).await?;
        let cards = parse_cards(&page.body, &self.base);
        if cards.is_empty() {
            warn!(%url, "no cards on page");
            return Err(ScrapeError::not_found(format!("No anime found for {}", what)));
        }
        info!(count = cards.len(), "scraped {}", what);
        Ok(cards)
    }

    pub async fn search_anime(&self, term: &str) -> Result<Vec<Anime>> {
        let url = self.url(&format!("/home/?s={}", urlencoding::encode(term)))?;
        self.cards(&url, format!("search term: {}", term)).await
    }

    pub async fn anime_by_category(&self, category: &str, page: u32, kind: Option<AnimeKind>) -> Result<Vec<Anime>> {
        if page < 1 {
            return Err(ScrapeError::bad_request("Page must be a positive integer"));
        }
        let mut url = paged(&self.base, &format!("category/{}", category), page)
            .ok_or_else(|| ScrapeError::bad_request(format!("invalid category {}", category)))?;
        if let Some(kind) = kind {
            url.query_pairs_mut().append_pair("type", kind.as_str());
        }
        self.cards(&url, format!("category '{}' on page {}", category, page))
            .await
    }

    pub async fn movies_page(&self, page: u32) -> Result<Vec<Anime>> {
        if page < 1 {
            return Err(ScrapeError::bad_request("Page must be a positive integer"));
        }
        let url = paged(&self.base, "movies", page).ok_or_else(|| ScrapeError::bad_request("invalid page"))?;
        self.cards(&url, format!("movies page {}", page)).await
    }

    async fn series_at(&self, slug: &str) -> Result<AnimeSeriesDetail> {
        let url = self.url(&format!("/series/{}/", slug))?;
        let page = self.fetch(&url).await?;
        parse_anime_series_detail(&page.body, &self.base, url)
            .ok_or_else(|| ScrapeError::not_found(format!("Series not found: {}", slug)))
    }

    // Slug of the search hit that best matches `term`
    async fn search_slug(&self, term: &str) -> Option<String> {
        let results = match self.search_anime(term).await {
            Ok(results) => results,
            Err(err) => {
                warn!(term, error = %err, "fallback search failed");
                return None;
            }
        };
        let squash = |s: &str| s.to_lowercase().replace(':', "").replace('-', " ");
        let wanted = squash(term);
        let best = results
            .iter()
            .find(|a| {
                let title = squash(&a.title);
                title.contains(&wanted) || wanted.contains(&title)
            })
            .or_else(|| results.first())?;
        series_slug_from_url(best.url.as_str())
            .or_else(|| MOVIE_IN_URL.captures(best.url.path()).map(|c| c[1].to_string()))
    }

    /// Series detail by slug, title or URL. A missing page triggers one
    /// search for the title and a retry with the slug the search found.
    pub async fn anime_series_detail(&self, input: &str, include_servers: bool) -> Result<AnimeSeriesDetail> {
        let slug = slug_from_input(input, series_slug_from_url);
        if slug.is_empty() {
            return Err(ScrapeError::bad_request("Series slug cannot be empty"));
        }

        let detail = match self.series_at(&slug).await {
            Ok(detail) => detail,
            Err(ScrapeError::NotFound(_)) => {
                let looks_like_url = input.starts_with("http") || input.contains('/');
                let term = if looks_like_url {
                    slug.replace('-', " ")
                } else {
                    input.trim().to_string()
                };
                info!(%slug, %term, "series not found, searching");
                let not_found = || {
                    ScrapeError::not_found(format!(
                        "Series not found: {}. Please try searching for the series first using /search-anime endpoint.",
                        slug
                    ))
                };
                let Some(found) = self.search_slug(&term).await else {
                    return Err(not_found());
                };
                if found == slug {
                    return Err(not_found());
                }
                info!(slug = %found, "retrying with slug from search");
                self.series_at(&found).await.map_err(|err| match err {
                    ScrapeError::NotFound(_) => not_found(),
                    other => other,
                })?
            }
            Err(err) => return Err(err),
        };

        info!(title = %detail.title, episodes = detail.episodes.len(), "series detail scraped");
        if !include_servers || detail.episodes.is_empty() {
            return Ok(detail);
        }

        let series_slug = series_slug_from_url(detail.url.as_str()).unwrap_or(slug);
        let series_slug = series_slug.as_str();
        let episodes: Vec<AnimeEpisode> = stream::iter(detail.episodes.into_iter().map(|ep| async move {
            match self.anime_episode(series_slug, ep.season, ep.episode_number).await {
                Ok(full) => AnimeEpisode {
                    servers: full.servers,
                    ..ep
                },
                Err(err) => {
                    warn!(episode = ep.episode_number, error = %err, "episode servers unavailable");
                    ep
                }
            }
        }))
        .buffered(EPISODE_SERVER_CONCURRENCY)
        .collect()
        .await;

        Ok(AnimeSeriesDetail { episodes, ..detail })
    }

    pub async fn anime_episode(&self, slug: &str, season: u32, episode: u32) -> Result<Episode> {
        if season < 1 || episode < 1 {
            return Err(ScrapeError::bad_request("Season and episode must be positive integers"));
        }
        let slug = normalize_slug(slug);
        let url = self.url(&format!("/episode/{}-{}x{}/", slug, season, episode))?;
        let page = self.fetch(&url).await.map_err(|err| match err {
            ScrapeError::NotFound(_) => ScrapeError::not_found(format!(
                "Episode not found for {} season {} episode {}",
                slug, season, episode
            )),
            other => other,
        })?;
        let parsed = parse_anime_episode_page(&page, &self.base, &slug, season, episode);

        let servers = servers::resolve_servers(&self.resolver, parsed.servers, EPISODE_DEPTH, self.concurrency).await;
        info!(%slug, season, episode, servers = servers.len(), "episode scraped");
        Ok(Episode {
            streaming_links: servers.iter().map(|s| s.url.clone()).collect(),
            servers,
            ..parsed
        })
    }

    /// Movie detail by slug, title or URL. `trembed`/`/embed/` candidates are
    /// resolved first; whatever still looks like an embed gets a deeper pass.
    pub async fn movie_detail(&self, input: &str) -> Result<MovieDetail> {
        let slug = slug_from_input(input, movie_slug_from_url);
        if slug.is_empty() {
            return Err(ScrapeError::bad_request("Movie slug cannot be empty"));
        }
        let url = self.url(&format!("/movies/{}/", slug))?;
        let page = self.fetch(&url).await.map_err(|err| match err {
            ScrapeError::NotFound(_) => ScrapeError::not_found(format!("Movie not found: {}", slug)),
            other => other,
        })?;
        let parsed = parse_movie_page(&page, &self.base, &slug);

        let resolver = &self.resolver;
        let candidates: Vec<StreamingServer> = stream::iter(parsed.servers.into_iter().map(|server| async move {
            if !is_trembed(&server.url) {
                return server;
            }
            match resolver.resolve_url(&server.url, CANDIDATE_DEPTH).await {
                Some(direct) => server.resolved(direct),
                None => server,
            }
        }))
        .buffered(self.concurrency.max(1))
        .collect()
        .await;

        let kept: Vec<StreamingServer> = candidates
            .into_iter()
            .filter(|s| {
                let lower = s.url.as_str().to_lowercase();
                s.kind == ServerType::Direct
                    || lower.contains("trembed")
                    || VIDEO_HINTS.iter().any(|hint| lower.contains(hint))
            })
            .collect();
        let servers = servers::resolve_servers(&self.resolver, kept, MOVIE_DEPTH, self.concurrency).await;

        info!(title = %parsed.title, servers = servers.len(), "movie detail scraped");
        Ok(MovieDetail {
            streaming_links: servers.iter().map(|s| s.url.clone()).collect(),
            servers,
            ..parsed
        })
    }
}
