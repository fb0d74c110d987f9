use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::registry::PageRegistry;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("static selector is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOutcome {
    /// Another call already ran discovery for this crawl.
    AlreadyProcessed,
    /// No catalog selector configured.
    Disabled,
    RegionMissing,
    Discovered { links: u32 },
}

/// Builds the book order from the catalog of the first processed page.
#[derive(Debug)]
pub struct CatalogDiscoverer {
    selector: Option<Selector>,
    processed: AtomicBool,
}

impl CatalogDiscoverer {
    pub fn new(selector: Option<Selector>) -> Self {
        Self {
            selector,
            processed: AtomicBool::new(false),
        }
    }

    /// Registers every relative catalog link with a 1-based serial in
    /// document order and hands it to `enqueue`. Runs at most once; later
    /// calls return [`CatalogOutcome::AlreadyProcessed`].
    pub fn discover(
        &self,
        document: &Html,
        base_url: &Url,
        registry: &PageRegistry,
        enqueue: &mut dyn FnMut(Url),
    ) -> CatalogOutcome {
        if self
            .processed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return CatalogOutcome::AlreadyProcessed;
        }

        let outcome = self.discover_once(document, base_url, registry, enqueue);
        tracing::info!(?outcome, "catalog processed");
        outcome
    }

    fn discover_once(
        &self,
        document: &Html,
        base_url: &Url,
        registry: &PageRegistry,
        enqueue: &mut dyn FnMut(Url),
    ) -> CatalogOutcome {
        let Some(selector) = &self.selector else {
            return CatalogOutcome::Disabled;
        };
        let Some(region) = document.select(selector).next() else {
            tracing::info!(base = %base_url, "catalog region not found");
            return CatalogOutcome::RegionMissing;
        };

        let mut serial = 0_u32;
        for anchor in region.select(&ANCHOR_SELECTOR) {
            let Some(href) = anchor.value().attr("href").map(str::trim) else {
                continue;
            };
            if !is_relative_page_link(href) {
                continue;
            }

            let target = match base_url.join(href) {
                Ok(target) => target,
                Err(err) => {
                    tracing::warn!(href, %err, "skip malformed catalog link");
                    continue;
                }
            };

            serial += 1;
            let title = anchor_text(anchor);
            registry.upsert_catalog_entry(target.as_str(), &title, serial);
            tracing::info!(url = %target, serial, "add to crawl list");
            enqueue(target);
        }

        CatalogOutcome::Discovered { links: serial }
    }
}

fn is_relative_page_link(href: &str) -> bool {
    !href.is_empty() && !href.starts_with('#') && !has_scheme(href)
}

/// `scheme ":"` per RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ).
fn has_scheme(href: &str) -> bool {
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn anchor_text(anchor: ElementRef<'_>) -> String {
    anchor
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
