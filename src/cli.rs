use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Crawl(CrawlArgs),
    Bundle(BundleArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// YAML config file (`base_url`, `max_depth`, selectors, `fetch`).
    #[arg(long)]
    pub config: Option<String>,

    /// Base URL (must be http/https). Overrides `base_url`.
    #[arg(long)]
    pub url: Option<String>,

    /// Output directory for `pages.jsonl` and `toc.jsonl`.
    #[arg(long)]
    pub out: String,

    /// Deepest path level below the base URL to process.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// CSS selector of the catalog (table of contents) region.
    #[arg(long)]
    pub catalog: Option<String>,

    /// CSS selector of the content region.
    #[arg(long)]
    pub content: Option<String>,

    /// Number of crawl workers.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Maximum pages to retrieve.
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Attempts per request.
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Per-request timeout.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Delay between requests (politeness).
    #[arg(long)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct BundleArgs {
    /// Input path to `pages.jsonl` (created by `crawl`).
    #[arg(long)]
    pub pages: String,

    /// Output path for the single-file HTML book.
    #[arg(long)]
    pub out: String,

    /// Book title.
    #[arg(long)]
    pub title: String,

    /// Overwrite the output if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
