//! Movie and series scraping for the hindilinks site.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{EPISODE_DEPTH, Settings};
use crate::error::{Result, ScrapeError};
use crate::http::{Fetcher, Page};
use crate::models::{Episode, Language, Movie, Series, SeriesDetail, SeriesEpisode};
use crate::resolver::Resolver;
use crate::resolver::classify::absolutize;
use crate::servers;
use crate::utils::{deslug, extract_year, image_url, non_empty, paged, text_of};

const EPISODE_SERVER_CONCURRENCY: usize = 10;

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static LIST: Lazy<Selector> = Lazy::new(|| sel("div.movies-list.movies-list-full"));
static ITEM: Lazy<Selector> = Lazy::new(|| sel("div.ml-item"));
static MASK: Lazy<Selector> = Lazy::new(|| sel("a.ml-mask"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static THUMB: Lazy<Selector> = Lazy::new(|| sel("img.mli-thumb"));
static QUALITY: Lazy<Selector> = Lazy::new(|| sel("span.mli-quality, span.mli-eps"));
static EPS: Lazy<Selector> = Lazy::new(|| sel("span.mli-eps"));
static TIP: Lazy<Selector> = Lazy::new(|| sel("#hidden_tip"));
static IMDB: Lazy<Selector> = Lazy::new(|| sel("div.jt-imdb"));
static INFO: Lazy<Selector> = Lazy::new(|| sel("div.jt-info"));
static DESC: Lazy<Selector> = Lazy::new(|| sel("p.f-desc"));
static GENRE_LINK: Lazy<Selector> = Lazy::new(|| sel("div.block a[href*=genre]"));
static NEXT_PAGE: Lazy<Selector> = Lazy::new(|| sel("div.pagination a.next.page-numbers"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a[href]"));

static HEADING: Lazy<Selector> = Lazy::new(|| sel("h1.entry-title, h1"));
static PAGE_TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
static CANONICAL: Lazy<Selector> = Lazy::new(|| sel(r#"link[rel=canonical], meta[property="og:url"]"#));
static OG_DESC: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="og:description"]"#));
static SERIES_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*='/series/']"));
static CONTENT: Lazy<Selector> = Lazy::new(|| sel("div.entry-content, div.description, p.f-desc"));
static POSTER: Lazy<Selector> = Lazy::new(|| sel("img.lazy.thumb, img.poster"));
static CATEGORY: Lazy<Selector> = Lazy::new(|| sel("div.category"));
static EXTRA: Lazy<Selector> = Lazy::new(|| sel("div.sheader, div.extra"));
static DATE: Lazy<Selector> = Lazy::new(|| sel("span.date, a[href*=release-year]"));
static RUNTIME: Lazy<Selector> = Lazy::new(|| sel("span.runtime"));
static ANY_GENRE: Lazy<Selector> = Lazy::new(|| sel("a[href*=genre]"));
static CAST: Lazy<Selector> = Lazy::new(|| sel("a[href*=cast]"));
static SEASON_BOX: Lazy<Selector> = Lazy::new(|| sel("div.se-c"));
static SEASON_ID: Lazy<Selector> = Lazy::new(|| sel("div[id^=season-]"));
static SEASON_CLASS: Lazy<Selector> = Lazy::new(|| sel("div[class*=season], div[class*=episode]"));
static SEASON_LABEL: Lazy<Selector> = Lazy::new(|| sel("span.se-t, div.se-q, h3, h4"));
static LI: Lazy<Selector> = Lazy::new(|| sel("li"));
static EPISODE_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*=episode]"));

static SEASON_IN_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:season|s)[\s:]*(\d+)").unwrap());
static SEASON_IN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)season[_-]?(\d+)").unwrap());
static SEASON_IN_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)season-(\d+)").unwrap());
static EPISODE_IN_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)episode-(\d+)").unwrap());
static EPISODE_IN_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:episode|ep)[\s:]*(\d+)").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*\d+\s*min").unwrap());

/// Records that can be filtered by a requested language.
pub trait LanguageTagged {
    fn title(&self) -> &str;
    fn language(&self) -> Option<&str>;
    fn description(&self) -> Option<&str>;
}

impl LanguageTagged for Movie {
    fn title(&self) -> &str {
        &self.title
    }
    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl LanguageTagged for Series {
    fn title(&self) -> &str {
        &self.title
    }
    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Keeps items whose language, description or title mentions `language`.
pub fn filter_by_language<T: LanguageTagged>(items: Vec<T>, language: Option<Language>) -> Vec<T> {
    let Some(language) = language else {
        return items;
    };
    let wanted = language.as_str();
    let mentions = |s: Option<&str>| s.is_some_and(|s| s.to_lowercase().contains(wanted));
    items
        .into_iter()
        .filter(|item| {
            mentions(item.language()) || mentions(item.description()) || mentions(Some(item.title()))
        })
        .collect()
}

// One `div.ml-item` card before it is split into a movie or a series
struct Card {
    title: String,
    url: Url,
    is_series: bool,
    image: Option<Url>,
    quality: Option<String>,
    imdb: Option<String>,
    year: Option<String>,
    duration: Option<String>,
    description: Option<String>,
    genres: Vec<String>,
    seasons: Option<String>,
    episodes: Option<String>,
    language: Option<String>,
}

impl Card {
    fn into_movie(self) -> Movie {
        Movie {
            title: self.title,
            url: self.url,
            image: self.image,
            quality: self.quality,
            imdb: self.imdb,
            year: self.year,
            duration: self.duration,
            description: self.description,
            genres: self.genres,
            language: self.language,
        }
    }

    fn into_series(self) -> Series {
        Series {
            title: self.title,
            url: self.url,
            image: self.image,
            quality: self.quality,
            imdb: self.imdb,
            year: self.year,
            duration: self.duration,
            description: self.description,
            genres: self.genres,
            seasons: self.seasons,
            episodes: self.episodes,
            language: self.language,
        }
    }
}

fn first_text(scope: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().map(|el| text_of(&el)).and_then(non_empty)
}

fn parse_card(item: ElementRef<'_>, base: &Url) -> Option<Card> {
    let mask = item.select(&MASK).next();
    let title = mask
        .and_then(|a| {
            ["oldtitle", "title"]
                .iter()
                .find_map(|attr| a.value().attr(attr).and_then(non_empty))
        })
        .or_else(|| {
            item.select(&IMG).next().and_then(|img| {
                ["alt", "title"]
                    .iter()
                    .find_map(|attr| img.value().attr(attr).and_then(non_empty))
            })
        })
        .or_else(|| mask.map(|a| text_of(&a)).and_then(non_empty));
    let url = mask
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| absolutize(href, base));
    let (Some(title), Some(url)) = (title, url) else {
        debug!("skipping listing card without title or url");
        return None;
    };

    let eps = first_text(&item, &EPS);
    let is_series = url.as_str().to_lowercase().contains("series") || item.select(&EPS).next().is_some();
    let image = item.select(&THUMB).next().and_then(|img| image_url(&img, base));
    let quality = first_text(&item, &QUALITY);

    let mut card = Card {
        title,
        url,
        is_series,
        image,
        quality,
        imdb: None,
        year: None,
        duration: None,
        description: None,
        genres: Vec::new(),
        seasons: None,
        episodes: eps,
        language: None,
    };

    if let Some(tip) = item.select(&TIP).next() {
        card.imdb = first_text(&tip, &IMDB);
        let infos: Vec<String> = tip.select(&INFO).map(|el| text_of(&el)).collect();
        card.year = infos.first().and_then(|first| extract_year(first));
        card.duration = infos.last().cloned().and_then(non_empty);
        card.description = first_text(&tip, &DESC);
        card.genres = tip
            .select(&GENRE_LINK)
            .map(|a| text_of(&a))
            .filter(|g| !g.is_empty())
            .collect();
        card.seasons = infos.first().and_then(|first| {
            first
                .split_once("Season")
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .map(str::to_string)
        });
        card.language = infos
            .iter()
            .find(|info| info.to_lowercase().contains("language"))
            .map(|info| {
                let stripped = info.replace("Language:", "");
                stripped.trim().to_string()
            })
            .or_else(|| {
                card.description
                    .as_deref()
                    .and_then(Language::detect)
                    .map(|l| l.as_str().to_string())
            })
            .or_else(|| {
                let lower = card.title.to_lowercase();
                Language::ALL
                    .into_iter()
                    .find(|l| {
                        lower.contains(&format!("({})", l)) || lower.contains(&format!("[{}]", l))
                    })
                    .map(|l| l.as_str().to_string())
            });
    }
    Some(card)
}

/// Listing page: every card plus the next page link, if any.
fn parse_cards(body: &str, base: &Url) -> (Vec<Card>, Option<Url>) {
    let document = Html::parse_document(body);
    let Some(list) = document.select(&LIST).next() else {
        warn!("no item list on listing page");
        return (Vec::new(), None);
    };
    let cards = list
        .select(&ITEM)
        .filter_map(|item| parse_card(item, base))
        .collect();
    let next = document
        .select(&NEXT_PAGE)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| absolutize(href, base));
    (cards, next)
}

pub fn parse_movies(body: &str, base: &Url) -> (Vec<Movie>, Option<Url>) {
    let (cards, next) = parse_cards(body, base);
    let movies = cards
        .into_iter()
        .filter(|c| !c.is_series)
        .map(Card::into_movie)
        .collect();
    (movies, next)
}

pub fn parse_series(body: &str, base: &Url) -> (Vec<Series>, Option<Url>) {
    let (cards, next) = parse_cards(body, base);
    let series = cards
        .into_iter()
        .filter(|c| c.is_series)
        .map(Card::into_series)
        .collect();
    (series, next)
}

fn is_missing_page(document: &Html) -> bool {
    let heading = document
        .select(&HEADING)
        .next()
        .or_else(|| document.select(&PAGE_TITLE).next())
        .map(|el| text_of(&el).to_lowercase());
    match heading {
        Some(text) => text.contains("404") || text.contains("not found"),
        None => true,
    }
}

/// Parses an episode page; `None` when the site served its 404 template.
pub fn parse_episode(page: &Page, base: &Url, slug: &str, season: u32, episode: u32) -> Option<Episode> {
    let document = Html::parse_document(&page.body);
    if is_missing_page(&document) {
        return None;
    }
    let root = document.root_element();

    let title_el = document.select(&HEADING).next();
    let title = title_el
        .map(|el| text_of(&el))
        .and_then(non_empty)
        .unwrap_or_else(|| format!("{} S{:02}E{:02}", deslug(slug), season, episode));
    let url = document
        .select(&CANONICAL)
        .next()
        .and_then(|el| el.value().attr("href").or_else(|| el.value().attr("content")))
        .and_then(|href| absolutize(href, base))
        .unwrap_or_else(|| page.url.clone());
    let series_title = first_text(&root, &SERIES_LINK).unwrap_or_else(|| deslug(slug));
    let description = first_text(&root, &CONTENT);
    let image = document.select(&POSTER).next().and_then(|img| image_url(&img, base));
    let duration = document
        .select(&INFO)
        .map(|el| text_of(&el))
        .find(|text| MINUTES.is_match(text));

    let og_description = document
        .select(&OG_DESC)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string);
    let category = first_text(&root, &CATEGORY);
    let language = [description.clone(), Some(title.clone()), og_description, category]
        .into_iter()
        .flatten()
        .find_map(|text| Language::detect(&text))
        .unwrap_or_else(|| {
            info!(slug, season, episode, "no language on episode page, assuming english");
            Language::English
        });

    let servers = servers::collect(&document, base, &page.url);
    Some(Episode {
        title,
        url,
        series_title,
        season,
        episode_number: episode,
        description,
        image,
        streaming_links: servers.iter().map(|s| s.url.clone()).collect(),
        servers,
        duration,
        language: Some(language.as_str().to_string()),
    })
}

fn season_number(container: &ElementRef<'_>) -> u32 {
    let mut season = container
        .select(&SEASON_LABEL)
        .next()
        .map(|el| text_of(&el))
        .and_then(|label| {
            SEASON_IN_LABEL
                .captures(&label)
                .map(|c| c[1].to_string())
                .or_else(|| DIGITS.find(&label).map(|m| m.as_str().to_string()))
        })
        .and_then(|n| n.parse().ok())
        .unwrap_or(1);
    if let Some(caps) = container.value().id().and_then(|id| SEASON_IN_ID.captures(id)) {
        season = caps[1].parse().unwrap_or(season);
    }
    season
}

fn capture_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text).and_then(|c| c[1].parse().ok())
}

fn series_episode(link: ElementRef<'_>, holder: ElementRef<'_>, base: &Url, season: u32, counter: &mut u32) -> Option<SeriesEpisode> {
    let url = absolutize(link.value().attr("href")?, base)?;
    let title = non_empty(text_of(&link)).unwrap_or_else(|| format!("Episode {}", *counter + 1));
    let number = capture_number(&EPISODE_IN_URL, url.as_str())
        .or_else(|| capture_number(&EPISODE_IN_TITLE, &title));
    let episode_number = match number {
        Some(n) => {
            *counter = (*counter).max(n);
            n
        }
        None => {
            *counter += 1;
            *counter
        }
    };
    let image = holder.select(&IMG).next().and_then(|img| image_url(&img, base));
    Some(SeriesEpisode {
        title,
        url,
        season,
        episode_number,
        image,
        duration: None,
        language: None,
        servers: Vec::new(),
    })
}

pub fn parse_series_detail(body: &str, base: &Url, slug: &str) -> SeriesDetail {
    let document = Html::parse_document(body);
    let root = document.root_element();

    let title = first_text(&root, &HEADING).unwrap_or_else(|| deslug(slug));
    let url = base
        .join(&format!("/series/{}/", slug))
        .unwrap_or_else(|_| base.clone());
    let description = first_text(&root, &CONTENT);
    let image = document.select(&POSTER).next().and_then(|img| image_url(&img, base));

    let extra = document.select(&EXTRA).next();
    let year = extra.and_then(|e| first_text(&e, &DATE));
    let duration = extra.and_then(|e| first_text(&e, &RUNTIME));

    let mut seen = HashSet::new();
    let genres = document
        .select(&ANY_GENRE)
        .map(|a| text_of(&a))
        .filter(|g| !g.is_empty() && seen.insert(g.clone()))
        .collect();
    let cast = document
        .select(&CAST)
        .map(|a| text_of(&a))
        .filter(|c| !c.is_empty())
        .collect();

    let mut containers: Vec<ElementRef> = document.select(&SEASON_BOX).collect();
    if containers.is_empty() {
        containers = document.select(&SEASON_ID).collect();
    }
    if containers.is_empty() {
        containers = document.select(&SEASON_CLASS).collect();
    }

    let mut episodes = Vec::new();
    for container in containers {
        let season = season_number(&container);
        let mut counter = 0;
        let items: Vec<ElementRef> = container.select(&LI).collect();
        if items.is_empty() {
            for link in container.select(&EPISODE_LINK) {
                let holder = link
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|el| matches!(el.value().name(), "li" | "div"))
                    .unwrap_or(link);
                episodes.extend(series_episode(link, holder, base, season, &mut counter));
            }
        } else {
            for item in items {
                let Some(link) = item.select(&ANCHOR).next() else {
                    continue;
                };
                episodes.extend(series_episode(link, item, base, season, &mut counter));
            }
        }
    }

    if episodes.is_empty() {
        debug!(slug, "no season containers, scanning episode links");
        for link in document.select(&EPISODE_LINK) {
            let Some(url) = link.value().attr("href").and_then(|h| absolutize(h, base)) else {
                continue;
            };
            let lower = url.as_str().to_lowercase();
            if !lower.contains(slug) {
                continue;
            }
            let (Some(season), Some(number)) = (
                capture_number(&SEASON_IN_URL, &lower),
                capture_number(&EPISODE_IN_URL, &lower),
            ) else {
                continue;
            };
            let holder = link
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| matches!(el.value().name(), "li" | "div" | "article"))
                .unwrap_or(link);
            episodes.push(SeriesEpisode {
                title: non_empty(text_of(&link)).unwrap_or_else(|| format!("Episode {}", number)),
                url,
                season,
                episode_number: number,
                image: holder.select(&IMG).next().and_then(|img| image_url(&img, base)),
                duration: None,
                language: None,
                servers: Vec::new(),
            });
        }
    }

    episodes.sort_by_key(|ep| (ep.season, ep.episode_number));
    let seasons: HashSet<u32> = episodes.iter().map(|ep| ep.season).collect();

    let language = Language::detect(&title)
        .or_else(|| description.as_deref().and_then(Language::detect));

    SeriesDetail {
        title,
        url,
        image,
        description,
        genres,
        languages: language.map(|l| l.as_str().to_string()).into_iter().collect(),
        year,
        imdb: None,
        quality: None,
        duration,
        seasons: Some(seasons.len().to_string()),
        episodes_count: Some(episodes.len().to_string()),
        cast,
        episodes,
    }
}

/// Scraper for the hindilinks movie/series site.
#[derive(Clone)]
pub struct Hindilinks {
    fetcher: Arc<dyn Fetcher>,
    resolver: Resolver,
    base: Url,
    concurrency: usize,
    page_delay: Duration,
}

impl Hindilinks {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: &Settings) -> Self {
        Self {
            resolver: Resolver::new(fetcher.clone()),
            fetcher,
            base: settings.hindilinks_url.clone(),
            concurrency: settings.resolve_concurrency,
            page_delay: settings.page_delay(),
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

    async fn movie_page(&self, url: &Url) -> Result<(Vec<Movie>, Option<Url>)> {
        let page = self.fetch(url).await?;
        Ok(parse_movies(&page.body, &self.base))
    }

    async fn series_listing(&self, url: &Url) -> Result<Vec<Series>> {
        let page = self.fetch(url).await?;
        Ok(parse_series(&page.body, &self.base).0)
    }

    /// Site search, following pagination for up to `max_pages` pages.
    pub async fn search_movies(&self, term: &str, language: Option<Language>, max_pages: u32) -> Result<Vec<Movie>> {
        let mut current = Some(self.url(&format!("/?s={}", urlencoding::encode(term)))?);
        let mut movies = Vec::new();
        let mut pages = 0;

        while let Some(url) = current.take() {
            if pages >= max_pages {
                break;
            }
            if pages > 0 {
                tokio::time::sleep(self.page_delay).await;
            }
            let (found, next) = self.movie_page(&url).await?;
            let found = filter_by_language(found, language);
            pages += 1;
            info!(term, page = pages, count = found.len(), "search page scraped");
            movies.extend(found);
            current = next;
        }

        if movies.is_empty() {
            return Err(ScrapeError::not_found(format!("No movies found for search term: {}", term)));
        }
        Ok(movies)
    }

    async fn single_movie_page(&self, path: &str, page: u32, what: String) -> Result<Vec<Movie>> {
        if page < 1 {
            return Err(ScrapeError::bad_request("Page must be a positive integer"));
        }
        let url = paged(&self.base, path, page)
            .ok_or_else(|| ScrapeError::bad_request(format!("invalid path {}", path)))?;
        let (movies, _) = self.movie_page(&url).await?;
        if movies.is_empty() {
            return Err(ScrapeError::not_found(format!("No movies found for {} on page {}", what, page)));
        }
        info!(count = movies.len(), page, "{}", what);
        Ok(movies)
    }

    pub async fn movies_by_year(&self, year: u32, page: u32) -> Result<Vec<Movie>> {
        if !(1900..=2025).contains(&year) {
            return Err(ScrapeError::bad_request("Year must be between 1900 and 2025"));
        }
        self.single_movie_page(&format!("release-year/{}", year), page, format!("year {}", year))
            .await
    }

    pub async fn movies_by_genre(&self, genre: &str, page: u32) -> Result<Vec<Movie>> {
        self.single_movie_page(&format!("genre/{}", genre), page, format!("genre {}", genre))
            .await
    }

    pub async fn movies_by_director(&self, director: &str, page: u32) -> Result<Vec<Movie>> {
        self.single_movie_page(&format!("director/{}", director), page, format!("director {}", director))
            .await
    }

    pub async fn series_page(&self, page: u32) -> Result<Vec<Series>> {
        if page < 1 {
            return Err(ScrapeError::bad_request("Page must be a positive integer"));
        }
        let url = paged(&self.base, "series", page)
            .ok_or_else(|| ScrapeError::bad_request("invalid page"))?;
        let series = self.series_listing(&url).await?;
        if series.is_empty() {
            return Err(ScrapeError::not_found(format!("No series found on page {}", page)));
        }
        Ok(series)
    }

    pub async fn search_series(&self, query: &str) -> Result<Vec<Series>> {
        if query.trim().is_empty() {
            return Err(ScrapeError::bad_request("Search query cannot be empty"));
        }
        let url = self.url(&format!("/series/?s={}", urlencoding::encode(query)))?;
        let series = self.series_listing(&url).await?;
        if series.is_empty() {
            return Err(ScrapeError::not_found(format!("No series found for search query: {}", query)));
        }
        Ok(series)
    }

    fn episode_candidates(&self, slug: &str, season: u32, episode: u32, language: Option<Language>) -> Vec<Url> {
        let mut paths = vec![
            format!("/episode/{slug}-season-{season}-episode-{episode}/"),
            format!("/{slug}-season-{season}-episode-{episode}/"),
            format!("/{slug}-season-{season}-part-{episode}-hindi-dubbed-Watch-online-full-movie/"),
            format!("/{slug}-season-{season}-episode-{episode}-hindi-dubbed-Watch-online-full-movie/"),
        ];
        if let Some(lang) = language {
            paths.push(format!("/{slug}-season-{season}-part-{episode}-{lang}-dubbed-Watch-online-full-movie/"));
            paths.push(format!("/{slug}-season-{season}-episode-{episode}-{lang}-dubbed-Watch-online-full-movie/"));
        }
        let mut seen = HashSet::new();
        paths
            .iter()
            .filter_map(|p| self.base.join(p).ok())
            .filter(|u| seen.insert(u.to_string()))
            .collect()
    }

    /// One episode with its servers resolved to direct links where possible.
    pub async fn episode(&self, slug: &str, season: u32, episode: u32, language: Option<Language>) -> Result<Episode> {
        if season < 1 || episode < 1 {
            return Err(ScrapeError::bad_request("Season and episode must be positive integers"));
        }

        let mut parsed = None;
        let mut last_error = None;
        for (attempt, url) in self.episode_candidates(slug, season, episode, language).into_iter().enumerate() {
            if attempt > 0 {
                tokio::time::sleep(self.page_delay).await;
            }
            match self.fetch(&url).await {
                Ok(page) => {
                    if let Some(ep) = parse_episode(&page, &self.base, slug, season, episode) {
                        parsed = Some(ep);
                        break;
                    }
                    debug!(%url, "episode url served a not-found page");
                }
                Err(ScrapeError::NotFound(_)) => continue,
                Err(err) => {
                    debug!(%url, error = %err, "episode url failed");
                    last_error = Some(err);
                }
            }
        }

        let not_found = || {
            ScrapeError::not_found(format!(
                "Episode not found for {} season {} episode {}",
                slug, season, episode
            ))
        };
        let Some(parsed) = parsed else {
            return Err(last_error.unwrap_or_else(not_found));
        };

        let servers = servers::resolve_servers(&self.resolver, parsed.servers, EPISODE_DEPTH, self.concurrency).await;
        let episode_record = Episode {
            streaming_links: servers.iter().map(|s| s.url.clone()).collect(),
            servers,
            ..parsed
        };

        if let Some(lang) = language {
            let matches = episode_record
                .language
                .as_deref()
                .is_some_and(|l| l.contains(lang.as_str()));
            if !matches {
                warn!(slug, season, episode, found = ?episode_record.language, wanted = %lang, "language mismatch");
                return Err(ScrapeError::not_found(format!(
                    "Episode not available in {} for {} season {} episode {}",
                    lang, slug, season, episode
                )));
            }
        }

        info!(slug, season, episode, servers = episode_record.servers.len(), "episode scraped");
        Ok(episode_record)
    }

    /// Series page with its episode list; with `include_servers` every
    /// episode page is scraped too.
    pub async fn series_detail(&self, slug: &str, include_servers: bool) -> Result<SeriesDetail> {
        let url = self.url(&format!("/series/{}/", slug))?;
        let page = self.fetch(&url).await?;
        let detail = parse_series_detail(&page.body, &self.base, slug);
        if !include_servers || detail.episodes.is_empty() {
            return Ok(detail);
        }

        info!(slug, episodes = detail.episodes.len(), "fetching episode servers");
        let episodes: Vec<SeriesEpisode> = stream::iter(detail.episodes.into_iter().map(|ep| async move {
            let numbers = (
                capture_number(&SEASON_IN_URL, ep.url.as_str()),
                capture_number(&EPISODE_IN_URL, ep.url.as_str()),
            );
            let (Some(season), Some(number)) = numbers else {
                return ep;
            };
            match self.episode(slug, season, number, None).await {
                Ok(full) => SeriesEpisode {
                    servers: full.servers,
                    ..ep
                },
                Err(err) => {
                    warn!(slug, season, number, error = %err, "episode servers unavailable");
                    ep
                }
            }
        }))
        .buffered(EPISODE_SERVER_CONCURRENCY)
        .collect()
        .await;

        Ok(SeriesDetail { episodes, ..detail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeFetcher;

    const BASE: &str = "https://hl.example";

    const LISTING: &str = r#"
        <div class="movies-list movies-list-full">
          <div class="ml-item">
            <a class="ml-mask" href="/movie/iron-man-3/" oldtitle="Iron Man 3 (Hindi)">
              <span class="mli-quality">HD</span>
              <img class="lazy thumb mli-thumb" data-original="//img.example/im3.jpg" alt="Iron Man 3">
            </a>
            <div id="hidden_tip">
              <div class="jt-imdb">IMDb: 7.1</div>
              <div class="jt-info"><a href="/release-year/2013/">2013</a></div>
              <div class="jt-info">130 min</div>
              <p class="f-desc">Tony Stark faces the Mandarin. Hindi dubbed.</p>
              <div class="block">Genre: <a href="/genre/action/">Action</a>, <a href="/genre/sci-fi/">Sci-Fi</a></div>
            </div>
          </div>
          <div class="ml-item">
            <a class="ml-mask" href="/series/the-office/" title="The Office">
              <span class="mli-eps">EPS <i>9</i></span>
            </a>
            <div id="hidden_tip">
              <div class="jt-info">Season 9 episodes</div>
              <div class="jt-info">22 min</div>
            </div>
          </div>
          <div class="ml-item"><a class="ml-mask">No link</a></div>
        </div>
        <div class="pagination"><a class="next page-numbers" href="/page/2/?s=iron">Next</a></div>
    "#;

    fn base() -> Url {
        Url::parse(BASE).unwrap()
    }

    fn settings() -> Settings {
        Settings {
            hindilinks_url: base(),
            page_delay_ms: 0,
            ..Settings::default()
        }
    }

    #[test]
    fn listing_cards_split_into_movies_and_series() {
        let (movies, next) = parse_movies(LISTING, &base());
        assert_eq!(movies.len(), 1);
        let movie = &movies[0];
        assert_eq!(movie.title, "Iron Man 3 (Hindi)");
        assert_eq!(movie.url.as_str(), "https://hl.example/movie/iron-man-3/");
        assert_eq!(movie.image.as_ref().unwrap().as_str(), "https://img.example/im3.jpg");
        assert_eq!(movie.quality.as_deref(), Some("HD"));
        assert_eq!(movie.imdb.as_deref(), Some("IMDb: 7.1"));
        assert_eq!(movie.year.as_deref(), Some("2013"));
        assert_eq!(movie.duration.as_deref(), Some("130 min"));
        assert_eq!(movie.genres, ["Action", "Sci-Fi"]);
        assert_eq!(movie.language.as_deref(), Some("hindi"));
        assert_eq!(next.unwrap().as_str(), "https://hl.example/page/2/?s=iron");

        let (series, _) = parse_series(LISTING, &base());
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].title, "The Office");
        assert_eq!(series[0].seasons.as_deref(), Some("9"));
        assert_eq!(series[0].episodes.as_deref(), Some("EPS 9"));
    }

    #[test]
    fn language_filter_checks_language_description_and_title() {
        let (movies, _) = parse_movies(LISTING, &base());
        assert_eq!(filter_by_language(movies.clone(), Some(Language::Hindi)).len(), 1);
        assert!(filter_by_language(movies.clone(), Some(Language::Tamil)).is_empty());
        assert_eq!(filter_by_language(movies, None).len(), 1);
    }

    #[test]
    fn series_detail_reads_season_containers() {
        let body = r#"
            <h1 class="entry-title">The Office</h1>
            <div class="entry-content">A mockumentary. English audio.</div>
            <div class="sheader"><span class="date">2005</span><span class="runtime">22 min</span></div>
            <a href="/genre/comedy/">Comedy</a><a href="/genre/comedy/">Comedy</a>
            <div class="se-c"><span class="se-t">Season 2</span><ul>
              <li><a href="/episode/the-office-season-2-episode-2/">The Dundies</a></li>
              <li><a href="/episode/the-office-season-2-episode-1/">Diversity Day</a></li>
            </ul></div>
            <div class="se-c" id="season-1"><span class="se-t">1</span><ul>
              <li><a href="/episode/the-office-season-1-episode-1/">Pilot</a></li>
            </ul></div>
        "#;
        let detail = parse_series_detail(body, &base(), "the-office");
        assert_eq!(detail.title, "The Office");
        assert_eq!(detail.url.as_str(), "https://hl.example/series/the-office/");
        assert_eq!(detail.year.as_deref(), Some("2005"));
        assert_eq!(detail.genres, ["Comedy"]);
        assert_eq!(detail.languages, ["english"]);
        let order: Vec<_> = detail.episodes.iter().map(|e| (e.season, e.episode_number)).collect();
        assert_eq!(order, [(1, 1), (2, 1), (2, 2)]);
        assert_eq!(detail.seasons.as_deref(), Some("2"));
        assert_eq!(detail.episodes_count.as_deref(), Some("3"));
    }

    #[test]
    fn series_detail_falls_back_to_episode_links() {
        let body = r#"<h1>Show</h1>
            <p><a href="/show-season-1-episode-3/">three</a><a href="/other-season-1-episode-1/">x</a></p>"#;
        let detail = parse_series_detail(body, &base(), "show");
        assert_eq!(detail.episodes.len(), 1);
        assert_eq!(detail.episodes[0].episode_number, 3);
    }

    #[tokio::test]
    async fn search_follows_pagination_up_to_the_limit() {
        let page2 = LISTING.replace("/page/2/?s=iron", "/page/3/?s=iron");
        let fetcher = Arc::new(
            FakeFetcher::new()
                .page("https://hl.example/?s=iron%20man", LISTING)
                .page("https://hl.example/page/2/?s=iron", &page2),
        );
        let site = Hindilinks::new(fetcher.clone(), &settings());
        let movies = site.search_movies("iron man", None, 2).await.unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(fetcher.hits(), 2);
    }

    #[tokio::test]
    async fn empty_listing_is_not_found() {
        let fetcher = Arc::new(FakeFetcher::new().page("https://hl.example/genre/none/", "<html></html>"));
        let site = Hindilinks::new(fetcher, &settings());
        let err = site.movies_by_genre("none", 1).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound(_)));
        let err = site.movies_by_year(1800, 1).await.unwrap_err();
        assert!(matches!(err, ScrapeError::BadRequest(_)));
    }

    #[tokio::test]
    async fn episode_tries_url_patterns_and_resolves_embeds() {
        let episode_page = r#"
            <h1 class="entry-title">Show S01E02</h1>
            <div class="entry-content">Watch in Hindi.</div>
            <div class="player-wrap"><iframe src="https://player.example/embed/e2"></iframe></div>
        "#;
        let fetcher = Arc::new(
            FakeFetcher::new()
                .page("https://hl.example/show-season-1-episode-2/", episode_page)
                .page("https://player.example/embed/e2", r#"<video src="https://cdn.example/e2.m3u8"></video>"#),
        );
        let site = Hindilinks::new(fetcher.clone(), &settings());
        let ep = site.episode("show", 1, 2, Some(Language::Hindi)).await.unwrap();
        assert_eq!(ep.language.as_deref(), Some("hindi"));
        assert_eq!(ep.servers.len(), 1);
        assert_eq!(ep.servers[0].url.as_str(), "https://cdn.example/e2.m3u8");
        assert_eq!(ep.streaming_links[0].as_str(), "https://cdn.example/e2.m3u8");
        assert_eq!(
            fetcher.requested()[..2],
            ["https://hl.example/episode/show-season-1-episode-2/", "https://hl.example/show-season-1-episode-2/"]
        );

        let err = site.episode("show", 1, 2, Some(Language::Tamil)).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound(_)));
    }

    #[tokio::test]
    async fn not_found_template_is_skipped() {
        let fetcher = Arc::new(
            FakeFetcher::new().page("https://hl.example/episode/gone-season-1-episode-1/", "<h1>404 Not Found</h1>"),
        );
        let site = Hindilinks::new(fetcher, &settings());
        let err = site.episode("gone", 1, 1, None).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound(_)));
    }
}
