use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use super::fetch::{DetailFetcher, PageSource};
use super::types::{CatalogRecord, CatalogStub, EnrichedDetail, sanitize_fetch_concurrency};

pub async fn enrich<S>(
    stubs: Vec<CatalogStub>,
    fetcher: Arc<DetailFetcher<S>>,
    concurrency: usize,
) -> Vec<CatalogRecord>
where
    S: PageSource + 'static,
{
    let concurrency = sanitize_fetch_concurrency(concurrency);
    let total = stubs.len();
    let mut slots: Vec<Option<EnrichedDetail>> = vec![None; total];
    let mut queue = stubs
        .iter()
        .enumerate()
        .map(|(index, stub)| (index, stub.url.clone()))
        .collect::<VecDeque<_>>();

    let mut set = JoinSet::new();
    loop {
        while set.len() < concurrency {
            let Some((index, url)) = queue.pop_front() else {
                break;
            };
            let fetcher = Arc::clone(&fetcher);
            set.spawn(async move {
                let detail = fetcher.fetch(&url).await;
                (index, detail)
            });
        }

        let Some(joined) = set.join_next().await else {
            break;
        };
        match joined {
            Ok((index, detail)) => {
                info!(name = %stubs[index].name, "details fetched");
                slots[index] = Some(detail);
            }
            Err(err) => {
                error!(error = %err, "detail worker failed");
            }
        }
    }

    stubs
        .into_iter()
        .zip(slots)
        .enumerate()
        .map(|(index, (stub, detail))| {
            let detail = detail.unwrap_or_else(|| {
                error!(index, url = %stub.url, "no details for catalog entry, using sentinel");
                EnrichedDetail::sentinel()
            });
            CatalogRecord::merge(stub, detail)
        })
        .collect()
}
