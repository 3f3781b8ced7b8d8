use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;

use super::{HandlerError, JobHandler};
use crate::models::execution::JobExecution;
use crate::models::job::{MarketCode, ScheduleJob};
use crate::services::collector::{CollectRequest, MarketCollector};

const DEFAULT_ORDER_DAYS_BACK: i64 = 1;

#[derive(Debug, Clone, Copy)]
enum Collection {
    Products,
    Orders { days_back: i64 },
}

/// Run one collection per market code, in order. The first market that
/// fails aborts the whole run; partial counts are not reported.
async fn collect_markets(
    collector: &dyn MarketCollector,
    job: &ScheduleJob,
    kind: Collection,
) -> Result<Value, HandlerError> {
    let mut markets = Map::new();
    let mut skipped = Vec::new();
    let mut total: u64 = 0;

    for code in &job.market_codes {
        let market = match MarketCode::from_str(code) {
            Ok(market) => market,
            Err(_) => {
                tracing::warn!(job_id = job.id, market = %code, "Unsupported market code, skipping");
                skipped.push(code.clone());
                continue;
            }
        };

        let request = CollectRequest {
            market,
            account_ids: &job.account_ids,
            parameters: &job.parameters,
        };

        let result = match kind {
            Collection::Products => collector.collect_products(request).await,
            Collection::Orders { days_back } => collector.collect_orders(request, days_back).await,
        };

        let count = result.map_err(|source| HandlerError::Collector {
            market: market.to_string(),
            source,
        })?;

        tracing::info!(job_id = job.id, %market, count, "Market collection finished");
        markets.insert(market.to_string(), json!(count));
        total += count;
    }

    let mut summary = json!({
        "markets": markets,
        "total": total,
    });
    if !skipped.is_empty() {
        summary["skipped"] = json!(skipped);
    }
    if let Collection::Orders { days_back } = kind {
        summary["days_back"] = json!(days_back);
    }
    Ok(summary)
}

/// Collects product listings from every market on the job.
pub struct ProductCollectionHandler {
    collector: Arc<dyn MarketCollector>,
}

impl ProductCollectionHandler {
    pub fn new(collector: Arc<dyn MarketCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl JobHandler for ProductCollectionHandler {
    async fn run(&self, job: &ScheduleJob, _execution: &JobExecution) -> Result<Value, HandlerError> {
        collect_markets(self.collector.as_ref(), job, Collection::Products).await
    }
}

/// Collects recent orders (`parameters.days_back`, default 1) from every market on the job.
pub struct OrderCollectionHandler {
    collector: Arc<dyn MarketCollector>,
}

impl OrderCollectionHandler {
    pub fn new(collector: Arc<dyn MarketCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl JobHandler for OrderCollectionHandler {
    async fn run(&self, job: &ScheduleJob, _execution: &JobExecution) -> Result<Value, HandlerError> {
        let days_back = job.param_i64("days_back", DEFAULT_ORDER_DAYS_BACK);
        collect_markets(self.collector.as_ref(), job, Collection::Orders { days_back }).await
    }
}
