//! `quran search`: full-text search from the command line.

use anyhow::Result;

use crate::config::Config;
use crate::query::{check_query_len, QueryService};
use crate::store::Store;

pub async fn run_search(config: &Config, query: &str, limit: Option<u32>) -> Result<()> {
    check_query_len(&config.retrieval, query)?;

    let store = Store::open(config).await?;
    let service = QueryService::new(store.clone(), config.retrieval.clone());
    let hits = service.search(query, limit).await;
    store.close().await;
    let hits = hits?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for hit in &hits {
        match &hit.snippet {
            Some(snippet) => println!("{:>3}:{:<3}  {}", hit.chapter, hit.verse, flatten(snippet)),
            None => println!("{:>3}:{:<3}", hit.chapter, hit.verse),
        }
    }
    println!();
    println!("{} hit(s)", hits.len());

    Ok(())
}

fn flatten(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
