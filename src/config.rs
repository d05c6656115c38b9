use std::io::ErrorKind;
use std::time::Duration;

use clap::Args;
use url::Url;

use crate::http::FetchOptions;

pub const HINDILINKS_URL: &str = "https://hindilinks4u.delivery";
pub const TOONSTREAM_URL: &str = "https://toonstream.one";

/// Hop budget for embeds found on episode pages.
pub const EPISODE_DEPTH: u32 = 2;
/// Hop budget for `trembed`/`/embed/` candidates on movie pages, before the
/// movie's servers get their own pass at [`MOVIE_DEPTH`].
pub const CANDIDATE_DEPTH: u32 = 2;
/// Hop budget for embeds found on movie pages.
pub const MOVIE_DEPTH: u32 = 3;

/// Runtime settings shared by every subcommand. Each flag can also come from
/// the environment (or a `.env` file).
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Base URL of the movie/series site
    #[arg(long, env = "HINDILINKS_URL", default_value = HINDILINKS_URL, global = true)]
    pub hindilinks_url: Url,

    /// Base URL of the anime site
    #[arg(long, env = "TOONSTREAM_URL", default_value = TOONSTREAM_URL, global = true)]
    pub toonstream_url: Url,

    /// Per-request timeout in seconds
    #[arg(long, env = "SCRAPER_TIMEOUT_SECS", default_value_t = 20, global = true)]
    pub timeout_secs: u64,

    /// Retries for connect/timeout failures
    #[arg(long, env = "SCRAPER_RETRIES", default_value_t = 3, global = true)]
    pub retries: u32,

    /// Embed resolutions running at once for a single page
    #[arg(long, env = "SCRAPER_RESOLVE_CONCURRENCY", default_value_t = 5, global = true)]
    pub resolve_concurrency: usize,

    /// Pause between listing pages, in milliseconds
    #[arg(long, env = "SCRAPER_PAGE_DELAY_MS", default_value_t = 1000, global = true)]
    pub page_delay_ms: u64,
}

impl Settings {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hindilinks_url: Url::parse(HINDILINKS_URL).expect("valid default URL"),
            toonstream_url: Url::parse(TOONSTREAM_URL).expect("valid default URL"),
            timeout_secs: 20,
            retries: 3,
            resolve_concurrency: 5,
            page_delay_ms: 1000,
        }
    }
}

/// Loads `.env` when present; a missing file is fine.
pub fn load_env_file() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
