use actix::prelude::*;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

use food_ordering::actors::IntegrityMonitorActor;
use food_ordering::config::AppConfig;
use food_ordering::dashboard::{Dashboard, DashboardFilter};
use food_ordering::domain::order::{CommandContext, OrderCommand, OrderCommandHandler, OrderStatus};
use food_ordering::domain::payment::{Announcement, OrderPaymentSubscriber, PaymentLedger, PaymentStatus};
use food_ordering::metrics::{self, Metrics};
use food_ordering::recovery::{verify_all, verify_order, RecoveryOptions, RecoveryService};
use food_ordering::store::{OrderStore, PgStore};
use food_ordering::telemetry;

#[derive(Parser)]
#[command(name = "orderctl")]
#[command(about = "Food ordering operations CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply SQL migrations
    Migrate,

    /// Serve /metrics and /health and run the periodic integrity monitor
    Run,

    /// Find incomplete orders; repair contact details, optionally delete the rest
    FixIncomplete {
        /// Report only, change nothing
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Only this order
        #[arg(long)]
        order_id: Option<Uuid>,

        /// Delete orders that cannot be repaired
        #[arg(long, default_value_t = false)]
        delete_unfixable: bool,

        /// Operator recorded on the events
        #[arg(long)]
        operator: Option<Uuid>,
    },

    /// Restore the values replaced by the last repair of an order
    UndoRepair {
        #[arg(long)]
        order_id: Uuid,

        #[arg(long)]
        operator: Option<Uuid>,
    },

    /// Read-only integrity report
    Verify {
        /// Only this order (default: all)
        #[arg(long)]
        order_id: Option<Uuid>,

        /// Print JSON instead of a summary
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Move an order to On the Way, Delivered or Cancelled
    SetStatus {
        #[arg(long)]
        order_id: Uuid,

        /// on-the-way | delivered | cancelled
        #[arg(long)]
        status: String,

        /// Cancellation reason
        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        operator: Option<Uuid>,
    },

    /// Record a payment status change (success is delivered to the order)
    Payment {
        #[arg(long)]
        payment_id: Uuid,

        /// pending | success | failed
        #[arg(long)]
        status: String,
    },

    /// Dashboard counts
    Counts {
        /// Day for the delivered count (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[actix::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pg = PgStore::connect(&config.database_url).await?;
    let store: Arc<dyn OrderStore> = Arc::new(pg.clone());
    let metrics = Arc::new(Metrics::new()?);

    match cli.cmd {
        Commands::Migrate => {
            pg.migrate().await?;
            println!("migrations_applied=true");
        }

        Commands::Run => {
            run_services(&config, store, metrics).await?;
        }

        Commands::FixIncomplete { dry_run, order_id, delete_unfixable, operator } => {
            let recovery = RecoveryService::new(store, config.placeholder_phone.clone(), metrics);
            let report = recovery
                .run(RecoveryOptions { dry_run, order_id, delete_unfixable, operator_id: operator })
                .await?;

            for finding in &report.findings {
                println!(
                    "order={} action={} issues=[{}]",
                    finding.order_id,
                    finding.action.label(),
                    finding.issues.join("; ")
                );
            }
            println!(
                "scanned={} incomplete={} repaired={} deleted={} dry_run={}",
                report.scanned, report.incomplete, report.repaired, report.deleted, dry_run
            );
        }

        Commands::UndoRepair { order_id, operator } => {
            let recovery = RecoveryService::new(store, config.placeholder_phone.clone(), metrics);
            let outcome = recovery.revert_last_repair(order_id, operator).await?;
            println!(
                "order={} delivery_address={:?} contact_phone={:?}",
                order_id, outcome.order.delivery_address, outcome.order.contact_phone
            );
        }

        Commands::Verify { order_id, json } => {
            let results = match order_id {
                Some(id) => vec![verify_order(store.as_ref(), id).await?],
                None => verify_all(store.as_ref()).await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for v in &results {
                    println!(
                        "order={} status={} bags={} items={} expected_total={} payment={} healthy={}",
                        v.order_id,
                        v.status,
                        v.bags_count,
                        v.total_items,
                        v.expected_total,
                        v.payment_amount.map(|a| a.to_string()).unwrap_or_else(|| "none".into()),
                        v.is_healthy()
                    );
                    for issue in &v.issues {
                        println!("  issue: {}", issue);
                    }
                }
                let unhealthy = results.iter().filter(|v| !v.is_healthy()).count();
                println!("verified={} unhealthy={}", results.len(), unhealthy);
            }
        }

        Commands::SetStatus { order_id, status, reason, operator } => {
            let target: OrderStatus = status.parse()?;
            let command = OrderCommand::for_target(target, reason)
                .context("orders return to Pending only through a successful payment")?;

            let ctx = match operator {
                Some(operator) => CommandContext::by_actor(operator),
                None => CommandContext::new(),
            };
            let handler = OrderCommandHandler::new(store, metrics);
            let outcome = handler.handle(order_id, command, ctx).await?;
            println!("order={} from={} to={}", order_id, outcome.previous_status, outcome.order.status);
        }

        Commands::Payment { payment_id, status } => {
            let status: PaymentStatus = status.parse()?;
            let subscriber = Arc::new(OrderPaymentSubscriber::new(
                store.clone(),
                config.terminal_payment_policy,
                config.retry.clone(),
                metrics,
            ));
            let ledger = PaymentLedger::new(store, subscriber);
            let recorded = ledger.record_status(payment_id, status).await?;
            let payment = &recorded.payment;
            println!(
                "payment={} status={} order={:?} announcement={}",
                payment.id,
                payment.status,
                payment.order_id,
                recorded.announcement.label()
            );
            if let Announcement::Failed(reason) = &recorded.announcement {
                anyhow::bail!("payment {} recorded but its order was not updated: {}", payment.id, reason);
            }
        }

        Commands::Counts { date } => {
            let today = date.unwrap_or_else(|| Utc::now().date_naive());
            let dashboard = Dashboard::new(store);
            let counts = dashboard.counts(today).await?;
            println!(
                "active={} pending={} on_the_way={} delivered_on_{}={}",
                counts.active, counts.pending, counts.on_the_way, today, counts.delivered_today
            );
            let delivered_paid = dashboard.orders(DashboardFilter::DeliveredPaid).await?.len();
            println!("delivered_paid_total={}", delivered_paid);
        }
    }

    Ok(())
}

async fn run_services(config: &AppConfig, store: Arc<dyn OrderStore>, metrics: Arc<Metrics>) -> Result<()> {
    tracing::info!(port = config.metrics_port, "Starting order services");

    let registry = metrics.registry().clone();
    let port = config.metrics_port;
    actix::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(registry, port).await {
            tracing::error!(error = %e, "Metrics server error");
        }
    });

    let recovery = Arc::new(RecoveryService::new(
        store.clone(),
        config.placeholder_phone.clone(),
        metrics.clone(),
    ));
    let monitor = IntegrityMonitorActor::new(store, recovery, metrics, config.monitor_interval).start();
    tracing::info!(connected = monitor.connected(), "Integrity monitor started");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    System::current().stop();
    Ok(())
}
