use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Context as _;
use lol_html::{HtmlRewriter, Settings, element};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::fetch::Fetcher;
use crate::formats::{ExtractedPage, page_id_from_url};
use crate::image::{encode_data_uri, is_inline_src};
use crate::registry::PageRegistry;

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("static selector is valid"));

#[derive(Debug)]
pub struct ContentExtractor {
    selector: Option<Selector>,
    base_url: Url,
}

impl ContentExtractor {
    pub fn new(selector: Option<Selector>, base_url: Url) -> Self {
        Self { selector, base_url }
    }

    /// Extracts the content region of `document` with every remote image
    /// inlined. Returns `None` when the page has no (non-empty) content
    /// region or no content selector is configured.
    pub fn extract(
        &self,
        document: &Html,
        url: &Url,
        registry: &PageRegistry,
        fetcher: &dyn Fetcher,
    ) -> Option<ExtractedPage> {
        let selector = self.selector.as_ref()?;
        let Some(region) = document.select(selector).next() else {
            tracing::info!(%url, "content region not found; skip");
            return None;
        };
        let region_html = region.inner_html();
        if region_html.trim().is_empty() {
            tracing::info!(%url, "content region is empty; skip");
            return None;
        }

        let html = self.inline_images(region, &region_html, fetcher);

        let record = registry.get(url.as_str());
        let (title, serial) = match record {
            Some(record) => (record.title, record.serial),
            None => (None, None),
        };
        tracing::info!(%url, ?serial, "extract content");

        Some(ExtractedPage {
            id: page_id_from_url(url.as_str()),
            url: url.to_string(),
            serial,
            title,
            html,
            retrieved_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Replaces every non-inline `img` source with a `data:` URI. Images
    /// that cannot be fetched or encoded keep their original source.
    ///
    /// Sources are read from the parsed region, so entity references are
    /// already decoded. Replacements are keyed by the image's position in
    /// document order, which the serialized `html` preserves.
    fn inline_images(&self, region: ElementRef<'_>, html: &str, fetcher: &dyn Fetcher) -> String {
        let sources: Vec<Option<&str>> = region
            .select(&IMG_SELECTOR)
            .map(|img| img.value().attr("src"))
            .collect();

        let mut inlined: HashMap<&str, Option<String>> = HashMap::new();
        for src in sources.iter().flatten().copied() {
            if src.trim().is_empty() || is_inline_src(src) || inlined.contains_key(src) {
                continue;
            }
            let data_uri = match self.fetch_inline(src, fetcher) {
                Ok(data_uri) => {
                    tracing::info!(%src, "download image and replace src");
                    Some(data_uri)
                }
                Err(err) => {
                    tracing::error!(%src, ?err, "inline image failed");
                    None
                }
            };
            inlined.insert(src, data_uri);
        }

        let replacements: Vec<Option<&str>> = sources
            .iter()
            .map(|src| {
                src.and_then(|src| inlined.get(src))
                    .and_then(|data_uri| data_uri.as_deref())
            })
            .collect();
        if replacements.iter().all(Option::is_none) {
            return html.to_owned();
        }

        match rewrite_image_sources(html, &replacements) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                tracing::warn!(?err, "rewrite images failed; keeping content as is");
                html.to_owned()
            }
        }
    }

    fn fetch_inline(&self, src: &str, fetcher: &dyn Fetcher) -> anyhow::Result<String> {
        let image_url = self
            .base_url
            .join(src.trim())
            .with_context(|| format!("resolve image src: {src}"))?;
        let image = fetcher
            .fetch_image(&image_url)
            .with_context(|| format!("fetch image: {image_url}"))?;
        encode_data_uri(&image, &image_url)
    }
}

/// Sets `src` on the n-th `img` of `html` to `replacements[n]` when present.
fn rewrite_image_sources(html: &str, replacements: &[Option<&str>]) -> anyhow::Result<String> {
    let mut output = Vec::with_capacity(html.len());
    let mut position = 0usize;
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("img", |el| {
                if let Some(Some(data_uri)) = replacements.get(position) {
                    el.set_attribute("src", data_uri)?;
                }
                position += 1;
                Ok(())
            })],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|err| anyhow::anyhow!("rewrite html: {err}"))?;
    rewriter
        .end()
        .map_err(|err| anyhow::anyhow!("finish html rewrite: {err}"))?;

    String::from_utf8(output).context("rewritten html is not utf-8")
}
