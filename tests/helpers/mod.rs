//! Fake collaborators for driving the scheduler in-process

#![allow(dead_code)]

use async_trait::async_trait;
use market_scheduler::handlers::{HandlerError, JobHandler};
use market_scheduler::models::execution::JobExecution;
use market_scheduler::models::job::{MarketCode, ScheduleJob};
use market_scheduler::services::collector::{CollectRequest, CollectorError, MarketCollector};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Collector returning a fixed count per market and failing for `failing`.
#[derive(Default)]
pub struct FakeCollector {
    pub failing: Vec<MarketCode>,
    pub calls: Mutex<Vec<MarketCode>>,
}

impl FakeCollector {
    pub fn failing(markets: &[MarketCode]) -> Self {
        Self {
            failing: markets.to_vec(),
            ..Default::default()
        }
    }

    fn count_for(market: MarketCode) -> u64 {
        match market {
            MarketCode::Coupang => 12,
            MarketCode::Naver => 7,
            MarketCode::Elevenst => 5,
        }
    }

    fn collect(&self, market: MarketCode) -> Result<u64, CollectorError> {
        self.calls.lock().unwrap().push(market);
        if self.failing.contains(&market) {
            return Err(CollectorError::Market(format!("{market} API returned 503")));
        }
        Ok(Self::count_for(market))
    }
}

#[async_trait]
impl MarketCollector for FakeCollector {
    async fn collect_products(&self, request: CollectRequest<'_>) -> Result<u64, CollectorError> {
        self.collect(request.market)
    }

    async fn collect_orders(
        &self,
        request: CollectRequest<'_>,
        _days_back: i64,
    ) -> Result<u64, CollectorError> {
        self.collect(request.market)
    }
}

/// Handler that sleeps before succeeding and counts its invocations.
pub struct SlowHandler {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn run(&self, _job: &ScheduleJob, _execution: &JobExecution) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "records_processed": 1 }))
    }
}

/// Handler that panics.
pub struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    async fn run(&self, _job: &ScheduleJob, _execution: &JobExecution) -> Result<Value, HandlerError> {
        panic!("report template missing");
    }
}

/// Write an executable stand-in for `pg_dump` that writes a few bytes to the
/// path following `-f`.
#[cfg(unix)]
pub fn fake_pg_dump(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake_pg_dump.sh");
    let script = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-f" ]; then
    out="$2"
    shift
  fi
  shift
done
[ -n "$out" ] || exit 2
printf 'PGDMP-fake' > "$out"
"#;
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Lets a test keep a handle on a handler it registers.
pub struct SharedHandler<H>(pub Arc<H>);

#[async_trait]
impl<H: JobHandler> JobHandler for SharedHandler<H> {
    async fn run(&self, job: &ScheduleJob, execution: &JobExecution) -> Result<Value, HandlerError> {
        self.0.run(job, execution).await
    }
}
