use actix::prelude::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::dashboard::DashboardFilter;
use crate::domain::order::OrderError;
use crate::metrics::Metrics;
use crate::recovery::{RecoveryOptions, RecoveryService};
use crate::store::OrderStore;

// ============================================================================
// Integrity Monitor Actor - periodic dry-run scan for incomplete orders
// ============================================================================
//
// Responsibilities:
// - Run a dry-run recovery scan on a fixed interval
// - Publish active and incomplete order counts as gauges
// - Warn when incomplete orders appear
//
// Nothing is repaired here; operators run `orderctl fix-incomplete`.
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<IntegritySnapshot, OrderError>")]
pub struct RunIntegrityScan;

#[derive(Message)]
#[rtype(result = "Option<IntegritySnapshot>")]
pub struct GetLastScan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegritySnapshot {
    pub scanned: usize,
    pub incomplete: usize,
    pub active: u64,
    pub checked_at: DateTime<Utc>,
}

// ============================================================================
// Integrity Monitor Actor
// ============================================================================

pub struct IntegrityMonitorActor {
    store: Arc<dyn OrderStore>,
    recovery: Arc<RecoveryService>,
    metrics: Arc<Metrics>,
    interval: Duration,
    last_scan: Option<IntegritySnapshot>,
}

impl IntegrityMonitorActor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        recovery: Arc<RecoveryService>,
        metrics: Arc<Metrics>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            recovery,
            metrics,
            interval,
            last_scan: None,
        }
    }
}

impl Actor for IntegrityMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(interval_secs = self.interval.as_secs(), "IntegrityMonitorActor started");

        let addr = ctx.address();
        ctx.run_interval(self.interval, move |_act, _ctx| {
            addr.do_send(RunIntegrityScan);
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("IntegrityMonitorActor stopped");
    }
}

impl Handler<RunIntegrityScan> for IntegrityMonitorActor {
    type Result = AtomicResponse<Self, Result<IntegritySnapshot, OrderError>>;

    fn handle(&mut self, _msg: RunIntegrityScan, _: &mut Self::Context) -> Self::Result {
        let store = self.store.clone();
        let recovery = self.recovery.clone();

        AtomicResponse::new(Box::pin(
            async move {
                let report = recovery
                    .run(RecoveryOptions { dry_run: true, ..Default::default() })
                    .await?;
                let active = store.count_orders(&DashboardFilter::Active).await?;

                Ok::<_, OrderError>(IntegritySnapshot {
                    scanned: report.scanned,
                    incomplete: report.incomplete,
                    active,
                    checked_at: Utc::now(),
                })
            }
            .into_actor(self)
            .map(|result: Result<IntegritySnapshot, OrderError>, act, _ctx| {
                match &result {
                    Ok(snapshot) => {
                        act.metrics
                            .update_monitor_gauges(snapshot.active, snapshot.incomplete as u64);
                        if snapshot.incomplete > 0 {
                            tracing::warn!(
                                incomplete = snapshot.incomplete,
                                scanned = snapshot.scanned,
                                "Incomplete orders found"
                            );
                        } else {
                            tracing::debug!(scanned = snapshot.scanned, active = snapshot.active, "Integrity scan clean");
                        }
                        act.last_scan = Some(snapshot.clone());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Integrity scan failed");
                    }
                }
                result
            }),
        ))
    }
}

impl Handler<GetLastScan> for IntegrityMonitorActor {
    type Result = MessageResult<GetLastScan>;

    fn handle(&mut self, _msg: GetLastScan, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.last_scan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::order::{ContactPhone, DeliveryAddress, Fees, OrderAggregate};
    use crate::store::InMemoryStore;
    use uuid::Uuid;

    async fn bagless_order(store: &InMemoryStore) -> Uuid {
        let (order, _) = OrderAggregate::place(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            DeliveryAddress::parse("15 Broad Street, Lagos").unwrap(),
            ContactPhone::parse("08031234567").unwrap(),
            Fees::default(),
            Money::ZERO,
        )
        .unwrap();
        let id = order.id;
        store.put_order(order, vec![]).await;
        id
    }

    #[actix::test]
    async fn test_scan_reports_without_changing_orders() {
        let store = InMemoryStore::new();
        bagless_order(&store).await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let recovery = RecoveryService::new(
            Arc::new(store.clone()),
            ContactPhone::parse("0000000000").unwrap(),
            metrics.clone(),
        );

        let addr = IntegrityMonitorActor::new(
            Arc::new(store.clone()),
            Arc::new(recovery),
            metrics,
            Duration::from_secs(3600),
        )
        .start();

        let snapshot = addr.send(RunIntegrityScan).await.unwrap().unwrap();
        assert_eq!(snapshot.scanned, 1);
        assert_eq!(snapshot.incomplete, 1);
        assert_eq!(snapshot.active, 0);
        assert_eq!(store.order_count().await, 1);

        let last = addr.send(GetLastScan).await.unwrap();
        assert_eq!(last, Some(snapshot));
    }
}
