use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use scraper::Selector;
use serde::Deserialize;
use url::Url;

use crate::cli::CrawlArgs;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocsConfig {
    pub base_url: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub catalog_selector: Option<String>,
    #[serde(default)]
    pub content_selector: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub attempts: u32,
    pub timeout_ms: u64,
    pub delay_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout_ms: 10_000,
            delay_ms: 1_000,
            user_agent: "pagebook/0.1".to_owned(),
        }
    }
}

fn default_max_depth() -> u32 {
    8
}

fn default_concurrency() -> usize {
    4
}

/// Validated, immutable view of a [`DocsConfig`] shared by every worker.
#[derive(Debug)]
pub struct CrawlSettings {
    pub base_url: Url,
    pub max_depth: u32,
    pub catalog_selector: Option<Selector>,
    pub content_selector: Option<Selector>,
    pub concurrency: usize,
    pub max_pages: Option<usize>,
    pub fetch: FetchConfig,
}

impl DocsConfig {
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        serde_yaml::from_str(&yaml).with_context(|| format!("parse config: {}", path.display()))
    }

    /// Builds the effective config: the `--config` file (if any) with every
    /// explicitly passed flag layered on top.
    pub fn from_args(args: &CrawlArgs) -> anyhow::Result<Self> {
        let mut config = match args.config.as_deref() {
            Some(path) => Self::from_yaml_file(Path::new(path))?,
            None => {
                let base_url = args
                    .url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("--url is required without --config"))?;
                Self {
                    base_url,
                    max_depth: default_max_depth(),
                    catalog_selector: None,
                    content_selector: None,
                    concurrency: default_concurrency(),
                    max_pages: None,
                    fetch: FetchConfig::default(),
                }
            }
        };

        if let Some(url) = &args.url {
            config.base_url.clone_from(url);
        }
        if let Some(max_depth) = args.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(catalog) = &args.catalog {
            config.catalog_selector = Some(catalog.clone());
        }
        if let Some(content) = &args.content {
            config.content_selector = Some(content.clone());
        }
        if let Some(concurrency) = args.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(max_pages) = args.max_pages {
            config.max_pages = Some(max_pages);
        }
        if let Some(attempts) = args.attempts {
            config.fetch.attempts = attempts;
        }
        if let Some(timeout_ms) = args.timeout_ms {
            config.fetch.timeout_ms = timeout_ms;
        }
        if let Some(delay_ms) = args.delay_ms {
            config.fetch.delay_ms = delay_ms;
        }

        Ok(config)
    }

    pub fn settings(&self) -> anyhow::Result<Arc<CrawlSettings>> {
        let base_url = Url::parse(&self.base_url).context("parse base_url")?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            anyhow::bail!("base_url must be http/https: {base_url}");
        }
        if self.fetch.attempts == 0 {
            anyhow::bail!("fetch.attempts must be at least 1");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }

        let catalog_selector = self
            .catalog_selector
            .as_deref()
            .map(parse_selector)
            .transpose()
            .context("catalog_selector")?;
        let content_selector = self
            .content_selector
            .as_deref()
            .map(parse_selector)
            .transpose()
            .context("content_selector")?;

        Ok(Arc::new(CrawlSettings {
            base_url,
            max_depth: self.max_depth,
            catalog_selector,
            content_selector,
            concurrency: self.concurrency,
            max_pages: self.max_pages,
            fetch: self.fetch.clone(),
        }))
    }
}

pub fn parse_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector)
        .map_err(|err| anyhow::anyhow!("invalid CSS selector {selector:?}: {err}"))
}
