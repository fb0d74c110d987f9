use std::sync::Arc;

use scraper::Html;
use url::Url;

use crate::catalog::CatalogDiscoverer;
use crate::config::CrawlSettings;
use crate::content::ContentExtractor;
use crate::depth::url_depth;
use crate::fetch::Fetcher;
use crate::formats::ExtractedPage;
use crate::registry::PageRegistry;

#[derive(Debug)]
pub enum PageOutcome {
    /// Out of range (`depth` is `None` for pages unrelated to the base).
    Skipped { depth: Option<u32> },
    Processed { page: Option<ExtractedPage> },
}

/// Per-crawl state: the registry and the one-shot catalog latch live here,
/// so two crawls never share either.
#[derive(Debug)]
pub struct PageProcessor {
    settings: Arc<CrawlSettings>,
    registry: PageRegistry,
    catalog: CatalogDiscoverer,
    content: ContentExtractor,
}

impl PageProcessor {
    pub fn new(settings: Arc<CrawlSettings>) -> Self {
        let catalog = CatalogDiscoverer::new(settings.catalog_selector.clone());
        let content =
            ContentExtractor::new(settings.content_selector.clone(), settings.base_url.clone());
        Self {
            settings,
            registry: PageRegistry::new(),
            catalog,
            content,
        }
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn process(
        &self,
        url: &Url,
        html: &str,
        fetcher: &dyn Fetcher,
        enqueue: &mut dyn FnMut(Url),
    ) -> PageOutcome {
        tracing::info!(%url, "start to process");
        let base_url = &self.settings.base_url;
        let depth = url_depth(url, base_url);
        let Some(depth) = depth.filter(|depth| *depth <= self.settings.max_depth) else {
            tracing::info!(
                %url,
                ?depth,
                max_depth = self.settings.max_depth,
                "depth out of range; skip"
            );
            return PageOutcome::Skipped { depth };
        };

        self.registry.upsert_depth(url.as_str(), depth);

        let document = Html::parse_document(html);
        self.catalog
            .discover(&document, base_url, &self.registry, enqueue);
        let page = self
            .content
            .extract(&document, url, &self.registry, fetcher);

        PageOutcome::Processed { page }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::DocsConfig;
    use crate::fetch::FetchedImage;

    #[derive(Default)]
    struct CountingFetcher {
        images: Mutex<u32>,
    }

    impl Fetcher for CountingFetcher {
        fn fetch_page(&self, url: &Url) -> anyhow::Result<String> {
            anyhow::bail!("unexpected page fetch: {url}")
        }

        fn fetch_image(&self, _url: &Url) -> anyhow::Result<FetchedImage> {
            *self.images.lock().unwrap() += 1;
            Ok(FetchedImage {
                bytes: vec![1, 2, 3],
                content_type: Some("image/png".to_owned()),
            })
        }
    }

    fn processor(max_depth: u32) -> PageProcessor {
        let config = DocsConfig {
            base_url: "https://docs.example.com/guide/".to_owned(),
            max_depth,
            catalog_selector: Some("nav".to_owned()),
            content_selector: Some("article".to_owned()),
            concurrency: 1,
            max_pages: None,
            fetch: Default::default(),
        };
        PageProcessor::new(config.settings().unwrap())
    }

    const PAGE: &str = r#"<nav><a href="intro">Intro</a><a href="intro/detail">Detail</a></nav>
        <article><p>Body</p><img src="pic.png"></article>"#;

    fn process(processor: &PageProcessor, url: &str, fetcher: &CountingFetcher) -> (PageOutcome, Vec<Url>) {
        let mut queued = Vec::new();
        let url = Url::parse(url).unwrap();
        let outcome = processor.process(&url, PAGE, fetcher, &mut |url| queued.push(url));
        (outcome, queued)
    }

    #[test]
    fn base_page_discovers_catalog_and_emits_content() {
        let processor = processor(1);
        let fetcher = CountingFetcher::default();

        let (outcome, queued) = process(&processor, "https://docs.example.com/guide/", &fetcher);

        let page = match outcome {
            PageOutcome::Processed { page: Some(page) } => page,
            other => panic!("expected processed page, got {other:?}"),
        };
        assert_eq!(page.serial, None);
        assert_eq!(page.title, None);
        assert_eq!(queued.len(), 2);
        assert_eq!(*fetcher.images.lock().unwrap(), 1);

        let base = processor.registry().get("https://docs.example.com/guide/").unwrap();
        assert_eq!(base.depth, Some(0));
    }

    #[test]
    fn catalog_page_gets_title_and_serial_plus_depth() {
        let processor = processor(1);
        let fetcher = CountingFetcher::default();
        process(&processor, "https://docs.example.com/guide/", &fetcher);

        let (outcome, queued) = process(&processor, "https://docs.example.com/guide/intro", &fetcher);

        assert!(queued.is_empty());
        let page = match outcome {
            PageOutcome::Processed { page: Some(page) } => page,
            other => panic!("expected processed page, got {other:?}"),
        };
        assert_eq!(page.serial, Some(1));
        assert_eq!(page.title.as_deref(), Some("Intro"));
        let record = processor.registry().get("https://docs.example.com/guide/intro").unwrap();
        assert_eq!(record.depth, Some(1));
    }

    #[test]
    fn too_deep_page_is_skipped_before_any_work() {
        let processor = processor(1);
        let fetcher = CountingFetcher::default();

        let (outcome, queued) =
            process(&processor, "https://docs.example.com/guide/intro/detail", &fetcher);

        assert!(matches!(outcome, PageOutcome::Skipped { depth: Some(2) }));
        assert!(queued.is_empty());
        assert_eq!(*fetcher.images.lock().unwrap(), 0);
        assert!(processor.registry().is_empty());
    }

    #[test]
    fn unrelated_page_is_skipped() {
        let processor = processor(8);
        let fetcher = CountingFetcher::default();

        let (outcome, _) = process(&processor, "https://docs.example.com/blog/post", &fetcher);

        assert!(matches!(outcome, PageOutcome::Skipped { depth: None }));
        assert_eq!(*fetcher.images.lock().unwrap(), 0);
    }

    #[test]
    fn skipped_first_page_leaves_catalog_for_a_later_page() {
        let processor = processor(1);
        let fetcher = CountingFetcher::default();

        process(&processor, "https://docs.example.com/guide/intro/detail", &fetcher);
        let (_, queued) = process(&processor, "https://docs.example.com/guide/intro", &fetcher);

        assert_eq!(queued.len(), 2);
    }
}
