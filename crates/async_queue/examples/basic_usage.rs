//! Basic usage example for the async queue
//!
//! Expands a small "link graph": every page links to a couple of pages with
//! higher ids. The expansion stops after two layers or twelve pages,
//! whichever comes first.

use std::time::Duration;

use async_queue::{AsyncQueue, ExpansionReporter, QueueConfig, RequeueTerms, TracingReporter};

/// A fetched page and the pages it links to
#[derive(Clone, Debug)]
struct Page {
    id: u32,
    links: Vec<u32>,
}

async fn fetch_page(id: u32) -> Result<Page, String> {
    // Simulate some network latency
    tokio::time::sleep(Duration::from_millis(u64::from(id % 7) * 10)).await;
    if id % 13 == 0 {
        return Err(format!("page {id} is unavailable"));
    }
    Ok(Page {
        id,
        links: vec![id * 2, id * 2 + 1],
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Basic Async Queue Usage Example ===\n");

    let config = QueueConfig::builder()
        .max_depth(2)
        .max_results(12)
        .collect_transformed_data(|page: &Page, _: &u32| {
            let mut data = async_queue::DataMap::new();
            data.insert(page.id.to_string(), page.links.len().into());
            Ok(data)
        })
        .build()?;

    let mut reporter = TracingReporter::new();
    reporter.set_context("link-graph".to_string());
    let mut queue: AsyncQueue<u32, Page, Page, String> =
        AsyncQueue::new(config).with_reporter(reporter);

    queue.enqueue_all(
        fetch_page,
        [1, 5],
        |page| async move { Ok(page) },
        |page: Page| async move { Ok(RequeueTerms::Many(page.links)) },
    )?;

    let start_time = std::time::Instant::now();
    let (result, stats) = queue.begin_with_stats().await;

    println!("Expanded {} pages in {:?}", result.len(), start_time.elapsed());
    for (layer, pages) in &result.by_layer {
        let ids: Vec<u32> = pages.iter().map(|page| page.id).collect();
        println!("  layer {layer}: {ids:?}");
    }
    println!("\nStats: {}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
