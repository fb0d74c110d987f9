use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead as _, BufReader, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::BundleArgs;
use crate::formats::ExtractedPage;

pub fn bundle(args: BundleArgs) -> anyhow::Result<()> {
    let pages_path = PathBuf::from(&args.pages);
    let mut pages = read_pages(&pages_path)?;
    if pages.is_empty() {
        anyhow::bail!("no pages found in: {}", pages_path.display());
    }
    sort_pages(&mut pages);

    let out_path = PathBuf::from(&args.out);
    if out_path.exists() && !args.force {
        anyhow::bail!("bundle output already exists: {}", out_path.display());
    }
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create bundle parent dir: {}", parent.display()))?;
    }

    let html = render_book_html(&args.title, &pages);

    let mut out_options = OpenOptions::new();
    out_options.write(true);
    if args.force {
        out_options.create(true).truncate(true);
    } else {
        out_options.create_new(true);
    }
    let mut out = out_options
        .open(&out_path)
        .with_context(|| format!("open bundle output: {}", out_path.display()))?;
    out.write_all(html.as_bytes())
        .with_context(|| format!("write bundle output: {}", out_path.display()))?;
    out.flush()
        .with_context(|| format!("flush bundle output: {}", out_path.display()))?;

    tracing::info!(pages = pages.len(), out = %out_path.display(), "bundle written");
    Ok(())
}

pub fn read_pages(path: &Path) -> anyhow::Result<Vec<ExtractedPage>> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open pages log: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut pages = Vec::new();
    for line in reader.lines() {
        let line = line.context("read pages jsonl line")?;
        if line.trim().is_empty() {
            continue;
        }
        let page: ExtractedPage = serde_json::from_str(&line).context("parse page record")?;
        pages.push(page);
    }
    Ok(pages)
}

/// Book order: the unnumbered landing page first, then by serial. If a URL
/// was extracted more than once the last record wins.
pub fn sort_pages(pages: &mut Vec<ExtractedPage>) {
    let mut seen = HashSet::new();
    pages.reverse();
    pages.retain(|page| seen.insert(page.url.clone()));
    pages.sort_by(|a, b| (a.serial, &a.url).cmp(&(b.serial, &b.url)));
}

fn render_book_html(title: &str, pages: &[ExtractedPage]) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n");
    out.push_str("<html>\n");
    out.push_str("<head>\n");
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str(&format!("  <title>{}</title>\n", html_escape(title)));
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("<h1>{}</h1>\n", html_escape(title)));

    out.push_str("<nav>\n<ol>\n");
    for page in pages {
        out.push_str(&format!(
            "  <li><a href=\"#{}\">{}</a></li>\n",
            page.id,
            html_escape(page_title(page))
        ));
    }
    out.push_str("</ol>\n</nav>\n");

    for page in pages {
        out.push_str(&format!("<section id=\"{}\">\n", page.id));
        out.push_str(&format!("<h2>{}</h2>\n", html_escape(page_title(page))));
        out.push_str(page.html.trim());
        out.push_str("\n</section>\n");
    }

    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn page_title(page: &ExtractedPage) -> &str {
    match page.title.as_deref() {
        Some(title) if !title.trim().is_empty() => title,
        _ => &page.url,
    }
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
