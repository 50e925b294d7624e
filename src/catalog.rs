use std::sync::{Arc, LazyLock};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::PriceError;
use crate::extract::{extract_listings, RawListing};

pub const CATALOG_URL: &str = "https://zikom.pl/poleasingowe-komputery-stacjonarne/";

const CONCURRENCY: usize = 4;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

static PAGE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.js-search-link").unwrap());

/// One extracted listing with its provenance. Page and position make the
/// dataset order reproducible regardless of fetch concurrency.
#[derive(Debug, Clone)]
pub struct ScrapedListing {
    pub page: usize,
    pub position: usize,
    pub listing: RawListing,
}

/// Walk the whole catalog: discover the page count from the root page, fetch
/// every page, extract every listing. Fail-fast: a single page failure aborts
/// the walk rather than yielding a partial dataset.
pub async fn fetch_all(limit: Option<usize>) -> Result<Vec<ScrapedListing>, PriceError> {
    let client = Arc::new(Client::new());

    info!("fetching catalog root: {}", CATALOG_URL);
    let root = fetch_with_retry(&client, CATALOG_URL)
        .await
        .map_err(|e| PriceError::Acquisition(format!("catalog root: {}", e)))?;

    let total = discover_page_count(&root)?;
    let pages = limit.map_or(total, |n| total.min(n.max(1)));
    info!("catalog reports {} pages, walking {}", total, pages);

    let bodies = fetch_pages(&client, pages).await?;

    // Extraction is CPU-bound; fan out per page, order preserved by collect.
    let per_page: Vec<(usize, Vec<RawListing>)> = bodies
        .par_iter()
        .map(|(page, html)| (*page, extract_listings(html)))
        .collect();

    let listings: Vec<ScrapedListing> = per_page
        .into_iter()
        .flat_map(|(page, items)| {
            items
                .into_iter()
                .enumerate()
                .map(move |(position, listing)| ScrapedListing {
                    page,
                    position,
                    listing,
                })
        })
        .collect();

    let priced = listings.iter().filter(|l| l.listing.price.is_some()).count();
    info!(
        "extracted {} listings from {} pages ({} with a price)",
        listings.len(),
        pages,
        priced
    );
    Ok(listings)
}

/// Read the total page count off the pagination control: the second-to-last
/// page link holds the highest page number (the last one is "next"). A fragile
/// but documented heuristic; absent pagination markup fails loudly instead of
/// silently walking one page.
pub fn discover_page_count(root_html: &str) -> Result<usize, PriceError> {
    let doc = Html::parse_document(root_html);
    let labels: Vec<String> = doc
        .select(&PAGE_LINK_SEL)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .collect();

    if labels.len() < 2 {
        return Err(PriceError::Acquisition(
            "pagination control not found on catalog root".into(),
        ));
    }
    labels[labels.len() - 2].parse::<usize>().map_err(|_| {
        PriceError::Acquisition(format!(
            "pagination label {:?} is not a page number",
            labels[labels.len() - 2]
        ))
    })
}

pub fn page_url(page: usize) -> String {
    format!("{}?page={}", CATALOG_URL, page)
}

/// Fetch pages 1..=pages with bounded concurrency, then restore page order so
/// downstream steps see a deterministic dataset.
async fn fetch_pages(
    client: &Arc<Client>,
    pages: usize,
) -> Result<Vec<(usize, String)>, PriceError> {
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, anyhow::Result<String>)>(CONCURRENCY * 2);

    let pb = ProgressBar::new(pages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({per_sec})")
            .expect("static template")
            .progress_chars("=> "),
    );

    for page in 1..=pages {
        let client = Arc::clone(client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            let _permit = sem.acquire().await;
            let result = fetch_with_retry(&client, &page_url(page)).await;
            let _ = tx.send((page, result)).await;
        });
    }
    drop(tx);

    let mut bodies = Vec::with_capacity(pages);
    while let Some((page, result)) = rx.recv().await {
        match result {
            Ok(html) => bodies.push((page, html)),
            Err(e) => {
                pb.finish_and_clear();
                return Err(PriceError::Acquisition(format!("page {}: {}", page, e)));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    bodies.sort_by_key(|(page, _)| *page);
    Ok(bodies)
}

async fn fetch_with_retry(client: &Client, url: &str) -> anyhow::Result<String> {
    for attempt in 0..=MAX_RETRIES {
        match fetch_page(client, url).await {
            Ok(html) => return Ok(html),
            Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "transient failure on {} (attempt {}/{}), backing off {:.1}s: {}",
                    url,
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_secs_f64(),
                    e
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("retry loop always returns")
}

async fn fetch_page(client: &Client, url: &str) -> anyhow::Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("status {}", status);
    }
    Ok(response.text().await?)
}

fn is_transient(e: &anyhow::Error) -> bool {
    let msg = e.to_string();
    msg.contains("429") || msg.contains("500") || msg.contains("502") || msg.contains("503")
}
