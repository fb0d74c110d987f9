use std::collections::{HashSet, VecDeque};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::cli::CrawlArgs;
use crate::config::{CrawlSettings, DocsConfig};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::formats::{ExtractedPage, TocEntry};
use crate::processor::{PageOutcome, PageProcessor};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSummary {
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub extracted: usize,
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let config = DocsConfig::from_args(&args).context("load config")?;
    let settings = config.settings().context("validate config")?;

    let out_dir = PathBuf::from(&args.out);
    if out_dir.exists() {
        anyhow::bail!("crawl output directory already exists: {}", out_dir.display());
    }
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create crawl output dir: {}", out_dir.display()))?;

    // The blocking HTTP client must be built and dropped outside the async runtime.
    let fetch_config = settings.fetch.clone();
    let fetcher = tokio::task::spawn_blocking(move || HttpFetcher::new(&fetch_config))
        .await
        .context("spawn_blocking join")?
        .context("build fetcher")?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);

    let crawled = crawl_to_dir(settings, Arc::clone(&fetcher), &out_dir).await;
    tokio::task::spawn_blocking(move || drop(fetcher))
        .await
        .context("spawn_blocking join")?;
    let summary = crawled?;

    tracing::info!(
        fetched = summary.fetched,
        failed = summary.failed,
        skipped = summary.skipped,
        extracted = summary.extracted,
        "crawl complete"
    );
    Ok(())
}

/// Crawls from the base URL and writes `pages.jsonl` and `toc.jsonl`
/// into `out_dir`.
pub async fn crawl_to_dir(
    settings: Arc<CrawlSettings>,
    fetcher: Arc<dyn Fetcher>,
    out_dir: &Path,
) -> anyhow::Result<CrawlSummary> {
    let pages_path = out_dir.join("pages.jsonl");
    let pages_file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&pages_path)
        .with_context(|| format!("create pages log: {}", pages_path.display()))?;
    let mut pages_jsonl = BufWriter::new(pages_file);

    let processor = Arc::new(PageProcessor::new(settings));
    let summary = crawl(Arc::clone(&processor), fetcher, |page| {
        serde_json::to_writer(&mut pages_jsonl, &page).context("write page record json")?;
        pages_jsonl
            .write_all(b"\n")
            .context("write page record newline")
    })
    .await?;
    pages_jsonl.flush().context("flush pages log")?;

    let toc_path = out_dir.join("toc.jsonl");
    let toc_file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&toc_path)
        .with_context(|| format!("create toc: {}", toc_path.display()))?;
    let mut toc_jsonl = BufWriter::new(toc_file);
    for record in processor.registry().snapshot() {
        serde_json::to_writer(&mut toc_jsonl, &TocEntry::from(record))
            .context("write toc entry json")?;
        toc_jsonl.write_all(b"\n").context("write toc entry newline")?;
    }
    toc_jsonl.flush().context("flush toc")?;

    Ok(summary)
}

/// Drives the crawl until the frontier drains. Each page is fetched and
/// processed on a blocking task, at most `concurrency` at a time.
/// Extracted pages reach `emit` in completion order; an `emit` error stops
/// the crawl.
pub async fn crawl(
    processor: Arc<PageProcessor>,
    fetcher: Arc<dyn Fetcher>,
    mut emit: impl FnMut(ExtractedPage) -> anyhow::Result<()>,
) -> anyhow::Result<CrawlSummary> {
    let concurrency = processor.settings().concurrency.max(1);
    let mut frontier = Frontier::new(processor.settings().max_pages);
    frontier.admit(processor.settings().base_url.clone());

    let mut summary = CrawlSummary::default();
    let mut join_set = tokio::task::JoinSet::new();
    while !frontier.is_empty() || !join_set.is_empty() {
        while join_set.len() < concurrency {
            let Some(url) = frontier.pop() else {
                break;
            };
            let processor = Arc::clone(&processor);
            let fetcher = Arc::clone(&fetcher);
            join_set.spawn_blocking(move || {
                let visited = visit(&processor, fetcher.as_ref(), &url);
                (url, visited)
            });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        let (url, visited) = joined.context("join crawl task")?;
        let (outcome, discovered) = match visited {
            Ok(visited) => visited,
            Err(err) => {
                summary.failed += 1;
                tracing::warn!(%url, ?err, "page fetch failed; skip");
                continue;
            }
        };

        summary.fetched += 1;
        match outcome {
            PageOutcome::Skipped { .. } => summary.skipped += 1,
            PageOutcome::Processed { page: Some(page) } => {
                summary.extracted += 1;
                emit(page)?;
            }
            PageOutcome::Processed { page: None } => {}
        }
        for target in discovered {
            frontier.admit(target);
        }
    }

    Ok(summary)
}

/// Fetches and processes one page. Returns the outcome and the targets
/// the page handed to the frontier.
fn visit(
    processor: &PageProcessor,
    fetcher: &dyn Fetcher,
    url: &Url,
) -> anyhow::Result<(PageOutcome, Vec<Url>)> {
    let html = fetcher.fetch_page(url)?;
    let mut discovered = Vec::new();
    let mut enqueue = |target: Url| discovered.push(target);
    let outcome = processor.process(url, &html, fetcher, &mut enqueue);
    Ok((outcome, discovered))
}

/// FIFO of crawl targets owned by the driver. A URL (fragment ignored) is
/// admitted at most once.
#[derive(Debug)]
struct Frontier {
    queue: VecDeque<Url>,
    seen: HashSet<String>,
    admitted: usize,
    max_pages: Option<usize>,
}

impl Frontier {
    fn new(max_pages: Option<usize>) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            admitted: 0,
            max_pages,
        }
    }

    fn admit(&mut self, url: Url) {
        if self.max_pages.is_some_and(|max| self.admitted >= max) {
            tracing::debug!(%url, "max pages reached; drop");
            return;
        }
        let mut key = url.clone();
        key.set_fragment(None);
        if self.seen.insert(key.to_string()) {
            self.admitted += 1;
            self.queue.push_back(url);
        }
    }

    fn pop(&mut self) -> Option<Url> {
        self.queue.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::fetch::FetchedImage;

    struct SiteFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl SiteFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, html)| ((*url).to_owned(), (*html).to_owned()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    impl Fetcher for SiteFetcher {
        fn fetch_page(&self, url: &Url) -> anyhow::Result<String> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404: {url}"))
        }

        fn fetch_image(&self, url: &Url) -> anyhow::Result<FetchedImage> {
            anyhow::bail!("no images here: {url}")
        }
    }

    fn settings(max_depth: u32, concurrency: usize, max_pages: Option<usize>) -> Arc<CrawlSettings> {
        DocsConfig {
            base_url: "https://docs.example.com/guide/".to_owned(),
            max_depth,
            catalog_selector: Some("nav".to_owned()),
            content_selector: Some("article".to_owned()),
            concurrency,
            max_pages,
            fetch: Default::default(),
        }
        .settings()
        .unwrap()
    }

    fn site() -> SiteFetcher {
        SiteFetcher::new(&[
            (
                "https://docs.example.com/guide/",
                r#"<nav><a href="intro">Intro</a><a href="setup#top">Setup</a><a href="deep/er/page">Deep</a><a href="gone">Gone</a></nav><article>Home</article>"#,
            ),
            (
                "https://docs.example.com/guide/intro",
                r#"<nav><a href="other">Other</a></nav><article>Intro body</article>"#,
            ),
            (
                "https://docs.example.com/guide/setup#top",
                r#"<article>Setup body</article>"#,
            ),
            (
                "https://docs.example.com/guide/deep/er/page",
                r#"<article>Too deep</article>"#,
            ),
        ])
    }

    async fn collect(
        processor: &Arc<PageProcessor>,
        fetcher: &Arc<SiteFetcher>,
    ) -> (CrawlSummary, Vec<ExtractedPage>) {
        let mut pages = Vec::new();
        let summary = crawl(Arc::clone(processor), fetcher.clone(), |page| {
            pages.push(page);
            Ok(())
        })
        .await
        .unwrap();
        pages.sort_by_key(|page| page.serial);
        (summary, pages)
    }

    #[tokio::test]
    async fn crawls_catalog_pages_within_depth() {
        let processor = Arc::new(PageProcessor::new(settings(1, 3, None)));
        let fetcher = Arc::new(site());

        let (summary, pages) = collect(&processor, &fetcher).await;

        assert_eq!(
            summary,
            CrawlSummary {
                fetched: 4,
                failed: 1,
                skipped: 1,
                extracted: 3
            }
        );
        let titles = pages
            .iter()
            .map(|page| (page.serial, page.title.as_deref(), page.html.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            titles,
            vec![
                (None, None, "Home"),
                (Some(1), Some("Intro"), "Intro body"),
                (Some(2), Some("Setup"), "Setup body"),
            ]
        );
        // Catalog discovery ran once: the intro page's own nav was ignored.
        assert!(
            !fetcher
                .requested
                .lock()
                .unwrap()
                .iter()
                .any(|url| url.ends_with("/other"))
        );

        let toc = processor.registry().snapshot();
        assert_eq!(toc.len(), 5);
        assert_eq!(toc[0].url, "https://docs.example.com/guide/");
        assert_eq!(toc[0].depth, Some(0));
        assert_eq!(toc[4].serial, Some(4));
        assert_eq!(toc[4].depth, None);
    }

    #[tokio::test]
    async fn max_pages_caps_fetches() {
        let processor = Arc::new(PageProcessor::new(settings(8, 2, Some(2))));
        let fetcher = Arc::new(site());

        let (summary, _) = collect(&processor, &fetcher).await;

        assert_eq!(summary.fetched + summary.failed, 2);
        assert_eq!(fetcher.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn emit_error_stops_the_crawl() {
        let processor = Arc::new(PageProcessor::new(settings(1, 1, None)));
        let fetcher = Arc::new(site());

        let err = crawl(Arc::clone(&processor), fetcher.clone(), |_| anyhow::bail!("disk full"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("disk full"));
        // The first extracted page fails, so nothing past the landing page is fetched.
        assert_eq!(fetcher.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn serial_crawl_visits_in_admission_order() {
        let processor = Arc::new(PageProcessor::new(settings(8, 1, None)));
        let fetcher = Arc::new(site());

        collect(&processor, &fetcher).await;

        assert_eq!(
            *fetcher.requested.lock().unwrap(),
            vec![
                "https://docs.example.com/guide/",
                "https://docs.example.com/guide/intro",
                "https://docs.example.com/guide/setup#top",
                "https://docs.example.com/guide/deep/er/page",
                "https://docs.example.com/guide/gone",
            ]
        );
    }

    #[tokio::test]
    async fn writes_pages_and_toc_files() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let fetcher = Arc::new(site());

        crawl_to_dir(settings(1, 2, None), fetcher, temp.path()).await?;

        let pages = std::fs::read_to_string(temp.path().join("pages.jsonl"))?;
        let pages = pages
            .lines()
            .map(serde_json::from_str::<ExtractedPage>)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|page| page.id.starts_with("p_")));

        let toc = std::fs::read_to_string(temp.path().join("toc.jsonl"))?;
        let entries = toc
            .lines()
            .map(serde_json::from_str::<TocEntry>)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].serial, None);
        assert_eq!(entries[1].serial, Some(1));
        assert_eq!(entries[1].title.as_deref(), Some("Intro"));
        assert_eq!(entries[1].depth, Some(1));
        Ok(())
    }
}
