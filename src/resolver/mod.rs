//! Embed resolution: follows iframes, player scripts and redirects from an
//! embed page until a directly playable media URL turns up, or the hop
//! budget runs out.

pub mod classify;
pub mod providers;
pub mod scan;

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, trace};
use url::Url;

use crate::http::{Fetcher, Page};
use classify::{is_asset_url, parse_absolute};

/// What one strategy found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A playable URL; resolution ends here.
    Found(Url),
    /// Another embed page worth one more hop.
    Follow(Url),
}

#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Returns a direct media URL for `url`, or `None` when nothing playable
    /// is reachable within `max_depth` hops. Never fails: fetch errors and
    /// extraction misses only end the branch they happened in.
    pub async fn resolve(&self, url: &str, max_depth: u32) -> Option<String> {
        if max_depth == 0 {
            return None;
        }
        let url = parse_absolute(url)?;
        self.resolve_url(&url, max_depth).await.map(String::from)
    }

    /// [`Resolver::resolve`] for an already parsed URL.
    pub async fn resolve_url(&self, url: &Url, max_depth: u32) -> Option<Url> {
        let mut visited = HashMap::new();
        let found = self.resolve_at(url.clone(), max_depth, &mut visited).await;
        match &found {
            Some(direct) => debug!(embed = %url, %direct, "embed resolved"),
            None => debug!(embed = %url, "embed left unresolved"),
        }
        found
    }

    fn resolve_at<'a>(
        &'a self,
        url: Url,
        depth: u32,
        visited: &'a mut HashMap<String, u32>,
    ) -> BoxFuture<'a, Option<Url>> {
        async move {
            if depth == 0 {
                trace!(%url, "hop budget exhausted");
                return None;
            }
            if is_asset_url(&url) {
                trace!(%url, "not a media page, skipped");
                return None;
            }
            // Revisit only with a larger budget than any earlier attempt had
            if let Some(&seen) = visited.get(url.as_str()) {
                if seen >= depth {
                    debug!(%url, depth, seen, "already visited in this resolution");
                    return None;
                }
            }
            visited.insert(url.as_str().to_string(), depth);

            debug!(%url, depth, "resolving");
            let page = match self.fetcher.get(&url).await {
                Ok(page) => page,
                Err(err) => {
                    debug!(%url, error = %err, "candidate fetch failed");
                    return None;
                }
            };

            for (strategy, step) in candidates(&url, &page) {
                match step {
                    Step::Found(direct) => {
                        debug!(%url, strategy, %direct, "direct link found");
                        return Some(direct);
                    }
                    Step::Follow(next) => {
                        trace!(%url, strategy, %next, "following");
                        if let Some(direct) = self.resolve_at(next, depth - 1, visited).await {
                            return Some(direct);
                        }
                    }
                }
            }
            None
        }
        .boxed()
    }
}

/// Every candidate on one fetched page, providers first, then the generic
/// scan. The page body is parsed here and dropped before any further I/O.
fn candidates(requested: &Url, page: &Page) -> Vec<(&'static str, Step)> {
    let mut steps: Vec<(&'static str, Step)> = providers::matching(requested.as_str())
        .flat_map(|provider| {
            (provider.extract)(&page.body, &page.url)
                .into_iter()
                .map(move |step| (provider.name, step))
        })
        .collect();
    steps.extend(scan::plan(&page.body, &page.url));
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeFetcher;

    fn resolver(fetcher: &Arc<FakeFetcher>) -> Resolver {
        Resolver::new(fetcher.clone())
    }

    #[tokio::test]
    async fn zero_depth_never_fetches() {
        let fetcher = Arc::new(FakeFetcher::new().page("https://a.example/e/1", "<video src='https://c.example/v.mp4'>"));
        assert_eq!(resolver(&fetcher).resolve("https://a.example/e/1", 0).await, None);
        assert_eq!(fetcher.hits(), 0);
    }

    #[tokio::test]
    async fn asset_urls_never_fetch() {
        let fetcher = Arc::new(FakeFetcher::new());
        let resolver = resolver(&fetcher);
        for url in ["https://a.example/style.css", "https://a.example/poster.png", "//a.example/app.js"] {
            for depth in 1..4 {
                assert_eq!(resolver.resolve(url, depth).await, None);
            }
        }
        assert_eq!(fetcher.hits(), 0);
    }

    #[tokio::test]
    async fn video_source_on_the_page() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://page.example/watch",
            r#"<video><source src="https://cdn.example.com/a.mp4"></video>"#,
        ));
        assert_eq!(
            resolver(&fetcher).resolve("https://page.example/watch", 2).await.as_deref(),
            Some("https://cdn.example.com/a.mp4")
        );
    }

    #[tokio::test]
    async fn one_iframe_hop_into_a_player_script() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .page("https://page.example/watch", r#"<iframe src="//host.example.com/embed/xyz"></iframe>"#)
                .page(
                    "https://host.example.com/embed/xyz",
                    r#"<script>player.setup({ file: "https://cdn2.example.com/b.m3u8" })</script>"#,
                ),
        );
        assert_eq!(
            resolver(&fetcher).resolve("https://page.example/watch", 2).await.as_deref(),
            Some("https://cdn2.example.com/b.m3u8")
        );
        assert_eq!(
            fetcher.requested(),
            ["https://page.example/watch", "https://host.example.com/embed/xyz"]
        );
    }

    #[tokio::test]
    async fn social_iframes_are_not_followed() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://page.example/watch",
            r#"<iframe src="https://facebook.com/plugins/video.php?href=x"></iframe>"#,
        ));
        assert_eq!(resolver(&fetcher).resolve("https://page.example/watch", 2).await, None);
        assert_eq!(fetcher.hits(), 1);
    }

    fn iframe_chain(len: usize) -> FakeFetcher {
        let mut fetcher = FakeFetcher::new();
        for i in 0..len {
            let body = format!(r#"<iframe src="https://hop.example/{}"></iframe>"#, i + 1);
            fetcher = fetcher.page(&format!("https://hop.example/{}", i), &body);
        }
        fetcher.page(
            &format!("https://hop.example/{}", len),
            r#"<video src="https://cdn.example/final.mp4"></video>"#,
        )
    }

    #[tokio::test]
    async fn budget_one_stops_before_the_inner_iframe() {
        let fetcher = Arc::new(iframe_chain(1));
        assert_eq!(resolver(&fetcher).resolve("https://hop.example/0", 1).await, None);
        assert_eq!(fetcher.hits(), 1);
    }

    #[tokio::test]
    async fn nested_iframes_consume_one_hop_each() {
        let fetcher = Arc::new(iframe_chain(3));
        let resolver = resolver(&fetcher);
        assert_eq!(resolver.resolve("https://hop.example/0", 3).await, None);
        assert_eq!(fetcher.hits(), 3);
        assert_eq!(
            resolver.resolve("https://hop.example/0", 4).await.as_deref(),
            Some("https://cdn.example/final.mp4")
        );
    }

    #[tokio::test]
    async fn protocol_relative_results_become_https() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://page.example/watch",
            r#"<div data-stream="//media.example/stream/7"></div>"#,
        ));
        assert_eq!(
            resolver(&fetcher).resolve("https://page.example/watch", 1).await.as_deref(),
            Some("https://media.example/stream/7")
        );
    }

    #[tokio::test]
    async fn redirect_cycles_fail_fast() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .page("https://a.example/", r#"<script>window.location.href = "https://b.example/"</script>"#)
                .page("https://b.example/", r#"<script>window.location.href = "https://a.example/"</script>"#),
        );
        assert_eq!(resolver(&fetcher).resolve("https://a.example/", 5).await, None);
        assert_eq!(fetcher.hits(), 2);
    }

    #[tokio::test]
    async fn failed_iframe_falls_through_to_the_next_candidate() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://page.example/watch",
            r#"<iframe src="https://gone.example/e/1"></iframe>
               <iframe src="https://alive.example/e/2"></iframe>"#,
        ).page("https://alive.example/e/2", r#"<video src="/v.mp4"></video>"#));
        assert_eq!(
            resolver(&fetcher).resolve("https://page.example/watch", 2).await.as_deref(),
            Some("https://alive.example/v.mp4")
        );
    }

    #[tokio::test]
    async fn provider_hit_reuses_the_single_fetch() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://mixdrop.co/e/abc",
            r#"<script>MDCore.wurl = "//s-delivery1.mxdcontent.net/v/abc.mp4";</script>"#,
        ));
        assert_eq!(
            resolver(&fetcher).resolve("https://mixdrop.co/e/abc", 1).await.as_deref(),
            Some("https://s-delivery1.mxdcontent.net/v/abc.mp4")
        );
        assert_eq!(fetcher.hits(), 1);
    }

    #[tokio::test]
    async fn uploads_dir_media_in_a_script_is_found() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://page.example/watch",
            r#"<script>player.setup({ file: "https://site.example/wp-content/uploads/2024/05/movie.mp4" })</script>"#,
        ));
        assert_eq!(
            resolver(&fetcher).resolve("https://page.example/watch", 2).await.as_deref(),
            Some("https://site.example/wp-content/uploads/2024/05/movie.mp4")
        );
    }

    #[tokio::test]
    async fn poster_image_is_never_the_answer() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://page.example/watch",
            r#"<div class="player" data-poster="https://cdn.example.com/posters/ep1.jpg"></div>"#,
        ));
        assert_eq!(resolver(&fetcher).resolve("https://page.example/watch", 2).await, None);
    }

    #[tokio::test]
    async fn provider_miss_falls_through_to_the_generic_scan() {
        let fetcher = Arc::new(FakeFetcher::new().page(
            "https://dood.example/e/abc",
            r#"<video src="https://cdn.example/v/abc.mp4"></video>"#,
        ));
        assert_eq!(
            resolver(&fetcher).resolve("https://dood.example/e/abc", 1).await.as_deref(),
            Some("https://cdn.example/v/abc.mp4")
        );
        assert_eq!(fetcher.hits(), 1);
    }

    #[tokio::test]
    async fn shallow_failure_does_not_block_a_deeper_retry() {
        // a -> b reaches b with one hop left; the sibling path reaches it with two
        let fetcher = Arc::new(
            FakeFetcher::new()
                .page(
                    "https://x.example/root",
                    r#"<iframe src="https://x.example/a"></iframe><iframe src="https://x.example/b"></iframe>"#,
                )
                .page("https://x.example/a", r#"<iframe src="https://x.example/b"></iframe>"#)
                .page("https://x.example/b", r#"<iframe src="https://x.example/c"></iframe>"#)
                .page("https://x.example/c", r#"<video src="https://cdn.example/c.mp4"></video>"#),
        );
        assert_eq!(
            resolver(&fetcher).resolve("https://x.example/root", 3).await.as_deref(),
            Some("https://cdn.example/c.mp4")
        );
    }

    #[tokio::test]
    async fn resolving_twice_gives_the_same_answer() {
        let fetcher = Arc::new(iframe_chain(2));
        let resolver = resolver(&fetcher);
        let first = resolver.resolve("https://hop.example/0", 3).await;
        let second = resolver.resolve("https://hop.example/0", 3).await;
        assert_eq!(first.as_deref(), Some("https://cdn.example/final.mp4"));
        assert_eq!(first, second);
    }
}
