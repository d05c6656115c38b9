//! JSON API over the two scrapers and the embed resolver.
//!
//! Handlers only validate and normalize their inputs; scraping lives in
//! [`crate::hindilinks`] and [`crate::toonstream`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Settings;
use crate::error::{Result, ScrapeError};
use crate::hindilinks::Hindilinks;
use crate::http::Fetcher;
use crate::models::{Anime, AnimeSeriesDetail, Episode, Language, Movie, MovieDetail, Series, SeriesDetail};
use crate::resolver::Resolver;
use crate::toonstream::{AnimeKind, Toonstream};
use crate::utils::{movie_slug_from_url, sanitize_segment, sanitize_term, series_slug_from_url, slug_from_input};

const DEFAULT_MAX_PAGES: u32 = 3;
const MAX_PAGES: u32 = 10;
const DEFAULT_RESOLVE_DEPTH: u32 = 3;
const MAX_RESOLVE_DEPTH: u32 = 5;

#[derive(Clone)]
pub struct AppState {
    pub hindilinks: Hindilinks,
    pub toonstream: Toonstream,
    pub resolver: Resolver,
}

impl AppState {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: &Settings) -> Self {
        Self {
            hindilinks: Hindilinks::new(fetcher.clone(), settings),
            toonstream: Toonstream::new(fetcher.clone(), settings),
            resolver: Resolver::new(fetcher),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/search-movie", get(search_movies))
        .route("/release-year/:year/:page", get(movies_by_year))
        .route("/genre/:genre/:page", get(movies_by_genre))
        .route("/director/:director/:page", get(movies_by_director))
        .route("/series/:page", get(series_page))
        .route("/series/search/:query", get(search_series))
        .route("/series/detail/:slug", get(series_detail))
        .route("/episode/:slug/:season/:episode", get(episode))
        .route("/search-anime", get(search_anime))
        .route("/anime/category/:category/:page", get(anime_by_category))
        .route("/anime/series/:slug", get(anime_series_detail))
        .route("/anime/episode/:slug/:season/:episode", get(anime_episode))
        .route("/toonstream/movies/:page", get(toonstream_movies))
        .route("/toonstream/movie/:slug", get(toonstream_movie))
        .route("/resolve", get(resolve))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Media Scraper API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "movies": {
                "search": "/search-movie?search_term={term}&language={lang}&max_pages={pages}",
                "by_year": "/release-year/{year}/{page}",
                "by_genre": "/genre/{genre}/{page}",
                "by_director": "/director/{director}/{page}"
            },
            "series": {
                "list": "/series/{page}",
                "search": "/series/search/{query}",
                "detail": "/series/detail/{series_slug}?include_servers={bool}"
            },
            "episodes": {
                "get": "/episode/{series_slug}/{season}/{episode}?language={lang}"
            },
            "anime": {
                "search": "/search-anime?search_term={term}",
                "by_category": "/anime/category/{category}/{page}?type={movies|series}",
                "series_detail": "/anime/series/{series_slug}?include_servers={bool}",
                "episode_detail": "/anime/episode/{series_slug}/{season}/{episode}"
            },
            "toonstream_movies": {
                "list": "/toonstream/movies/{page}",
                "detail": "/toonstream/movie/{movie_slug}"
            },
            "resolve": "/resolve?url={embed_url}&depth={hops}"
        }
    }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

// Extractor failures come back as the same JSON error body as everything else
fn rejected(err: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::bad_request(err.to_string())
}

fn positive(name: &str, value: u32) -> Result<u32> {
    if value < 1 {
        return Err(ScrapeError::bad_request(format!("{} must be a positive integer", name)));
    }
    Ok(value)
}

fn search_term(raw: Option<&str>) -> Result<String> {
    let term = sanitize_term(raw.unwrap_or_default());
    if term.is_empty() {
        return Err(ScrapeError::bad_request("Search term cannot be empty or invalid"));
    }
    Ok(term)
}

fn segment(name: &str, raw: &str) -> Result<String> {
    let cleaned = sanitize_segment(raw);
    if cleaned.is_empty() {
        return Err(ScrapeError::bad_request(format!("{} cannot be empty or invalid", name)));
    }
    Ok(cleaned)
}

fn language(raw: Option<&str>) -> Result<Option<Language>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => sanitize_term(raw)
            .parse::<Language>()
            .map(Some)
            .map_err(ScrapeError::bad_request),
    }
}

#[derive(Debug, Deserialize)]
struct SearchMovieQuery {
    search_term: Option<String>,
    language: Option<String>,
    max_pages: Option<u32>,
}

async fn search_movies(
    State(state): State<AppState>,
    query: Result<Query<SearchMovieQuery>, QueryRejection>,
) -> Result<Json<Vec<Movie>>> {
    let Query(query) = query.map_err(rejected)?;
    let term = search_term(query.search_term.as_deref())?;
    let language = language(query.language.as_deref())?;
    let max_pages = query.max_pages.unwrap_or(DEFAULT_MAX_PAGES);
    if !(1..=MAX_PAGES).contains(&max_pages) {
        return Err(ScrapeError::bad_request(format!("max_pages must be between 1 and {}", MAX_PAGES)));
    }

    let movies = state.hindilinks.search_movies(&term, language, max_pages).await?;
    Ok(Json(movies))
}

async fn movies_by_year(
    State(state): State<AppState>,
    path: Result<Path<(u32, u32)>, PathRejection>,
) -> Result<Json<Vec<Movie>>> {
    let Path((year, page)) = path.map_err(rejected)?;
    let page = positive("Page", page)?;
    Ok(Json(state.hindilinks.movies_by_year(year, page).await?))
}

async fn movies_by_genre(
    State(state): State<AppState>,
    path: Result<Path<(String, u32)>, PathRejection>,
) -> Result<Json<Vec<Movie>>> {
    let Path((genre, page)) = path.map_err(rejected)?;
    let genre = segment("Genre", &genre)?;
    let page = positive("Page", page)?;
    Ok(Json(state.hindilinks.movies_by_genre(&genre, page).await?))
}

async fn movies_by_director(
    State(state): State<AppState>,
    path: Result<Path<(String, u32)>, PathRejection>,
) -> Result<Json<Vec<Movie>>> {
    let Path((director, page)) = path.map_err(rejected)?;
    let director = segment("Director", &director)?;
    let page = positive("Page", page)?;
    Ok(Json(state.hindilinks.movies_by_director(&director, page).await?))
}

async fn series_page(
    State(state): State<AppState>,
    path: Result<Path<u32>, PathRejection>,
) -> Result<Json<Vec<Series>>> {
    let Path(page) = path.map_err(rejected)?;
    let page = positive("Page", page)?;
    Ok(Json(state.hindilinks.series_page(page).await?))
}

async fn search_series(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<Series>>> {
    let Path(query) = path.map_err(rejected)?;
    Ok(Json(state.hindilinks.search_series(query.trim()).await?))
}

#[derive(Debug, Default, Deserialize)]
struct ServersQuery {
    #[serde(default)]
    include_servers: bool,
}

async fn series_detail(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ServersQuery>, QueryRejection>,
) -> Result<Json<SeriesDetail>> {
    let Path(slug) = path.map_err(rejected)?;
    let Query(query) = query.map_err(rejected)?;
    let slug = segment("Series slug", &slug)?;
    Ok(Json(state.hindilinks.series_detail(&slug, query.include_servers).await?))
}

#[derive(Debug, Deserialize)]
struct LanguageQuery {
    language: Option<String>,
}

async fn episode(
    State(state): State<AppState>,
    path: Result<Path<(String, u32, u32)>, PathRejection>,
    query: Result<Query<LanguageQuery>, QueryRejection>,
) -> Result<Json<Episode>> {
    let Path((slug, season, number)) = path.map_err(rejected)?;
    let Query(query) = query.map_err(rejected)?;
    let slug = segment("Series slug", &slug)?;
    let language = language(query.language.as_deref())?;

    info!(%slug, season, episode = number, language = ?language, "episode requested");
    Ok(Json(state.hindilinks.episode(&slug, season, number, language).await?))
}

#[derive(Debug, Deserialize)]
struct SearchAnimeQuery {
    search_term: Option<String>,
}

async fn search_anime(
    State(state): State<AppState>,
    query: Result<Query<SearchAnimeQuery>, QueryRejection>,
) -> Result<Json<Vec<Anime>>> {
    let Query(query) = query.map_err(rejected)?;
    let term = search_term(query.search_term.as_deref())?;
    Ok(Json(state.toonstream.search_anime(&term).await?))
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn anime_kind(raw: Option<&str>) -> Result<Option<AnimeKind>> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(None),
        Some("movies") => Ok(Some(AnimeKind::Movies)),
        Some("series") => Ok(Some(AnimeKind::Series)),
        Some(_) => Err(ScrapeError::bad_request("Type parameter must be 'movies' or 'series'")),
    }
}

async fn anime_by_category(
    State(state): State<AppState>,
    path: Result<Path<(String, u32)>, PathRejection>,
    query: Result<Query<CategoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Anime>>> {
    let Path((category, page)) = path.map_err(rejected)?;
    let Query(query) = query.map_err(rejected)?;
    let category = segment("Category", &category)?;
    let page = positive("Page", page)?;
    let kind = anime_kind(query.kind.as_deref())?;
    Ok(Json(state.toonstream.anime_by_category(&category, page, kind).await?))
}

async fn anime_series_detail(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ServersQuery>, QueryRejection>,
) -> Result<Json<AnimeSeriesDetail>> {
    let Path(input) = path.map_err(rejected)?;
    let Query(query) = query.map_err(rejected)?;
    if slug_from_input(&input, series_slug_from_url).is_empty() {
        return Err(ScrapeError::bad_request("Series slug cannot be empty or invalid"));
    }
    Ok(Json(state.toonstream.anime_series_detail(&input, query.include_servers).await?))
}

async fn anime_episode(
    State(state): State<AppState>,
    path: Result<Path<(String, u32, u32)>, PathRejection>,
) -> Result<Json<Episode>> {
    let Path((slug, season, number)) = path.map_err(rejected)?;
    let slug = slug_from_input(&slug, series_slug_from_url);
    if slug.is_empty() {
        return Err(ScrapeError::bad_request("Series slug cannot be empty or invalid"));
    }
    Ok(Json(state.toonstream.anime_episode(&slug, season, number).await?))
}

async fn toonstream_movies(
    State(state): State<AppState>,
    path: Result<Path<u32>, PathRejection>,
) -> Result<Json<Vec<Anime>>> {
    let Path(page) = path.map_err(rejected)?;
    let page = positive("Page", page)?;
    Ok(Json(state.toonstream.movies_page(page).await?))
}

async fn toonstream_movie(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<MovieDetail>> {
    let Path(input) = path.map_err(rejected)?;
    if slug_from_input(&input, movie_slug_from_url).is_empty() {
        return Err(ScrapeError::bad_request("Movie slug cannot be empty or invalid"));
    }
    Ok(Json(state.toonstream.movie_detail(&input).await?))
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    url: Option<String>,
    depth: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Resolved {
    url: String,
    resolved: Option<String>,
}

async fn resolve(
    State(state): State<AppState>,
    query: Result<Query<ResolveQuery>, QueryRejection>,
) -> Result<Json<Resolved>> {
    let Query(query) = query.map_err(rejected)?;
    let url = query
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ScrapeError::bad_request("url is required"))?;
    let depth = query.depth.unwrap_or(DEFAULT_RESOLVE_DEPTH);
    if depth > MAX_RESOLVE_DEPTH {
        return Err(ScrapeError::bad_request(format!("depth must be between 0 and {}", MAX_RESOLVE_DEPTH)));
    }

    let resolved = state.resolver.resolve(&url, depth).await;
    info!(%url, depth, found = resolved.is_some(), "resolve requested");
    Ok(Json(Resolved { url, resolved }))
}
