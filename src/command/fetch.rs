use anyhow::{Context, Result};

use agent_chat::enrich::{normalize_url, ContentFetcher, HttpContentFetcher};

pub async fn run_fetch(url: &str) -> Result<()> {
    let url = normalize_url(url);
    if url.is_empty() {
        anyhow::bail!("No URL given");
    }

    let fetcher = HttpContentFetcher::new().context("Failed to create page fetcher")?;
    println!("🌐 Fetching {}...\n", url);

    let summary = fetcher.fetch_summary(&url).await;
    if summary.trim().is_empty() {
        println!("⚠️  No content could be extracted from {}", url);
    } else {
        println!("{}", summary);
    }

    Ok(())
}
