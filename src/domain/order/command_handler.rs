use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::{Aggregate, EventEnvelope};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreTransaction};

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → (row update + event log)
//
// The row update and the event append share one transaction, and the row
// update is conditional on the version the command was decided against.
//
// ============================================================================

/// Who asked for a change and what it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub correlation_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
}

impl CommandContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            actor_id: None,
            causation_id: None,
        }
    }

    pub fn by_actor(actor_id: Uuid) -> Self {
        Self { actor_id: Some(actor_id), ..Self::new() }
    }

    pub fn caused_by(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}

/// State after a command, with the events it produced (possibly none).
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub order: OrderAggregate,
    pub previous_status: OrderStatus,
    pub events: Vec<OrderEvent>,
}

impl CommandOutcome {
    pub fn is_no_op(&self) -> bool {
        self.events.is_empty()
    }

    pub fn status_changed(&self) -> bool {
        self.previous_status != self.order.status
    }
}

pub struct OrderCommandHandler {
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
}

impl OrderCommandHandler {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Run one command in its own transaction.
    pub async fn handle(
        &self,
        order_id: Uuid,
        command: OrderCommand,
        ctx: CommandContext,
    ) -> Result<CommandOutcome, OrderError> {
        let mut tx = self.store.begin().await?;

        let snapshot = tx
            .load_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let outcome = Self::apply_in(tx.as_mut(), snapshot.order, &command, &ctx).await?;
        tx.commit().await?;

        self.record_outcome(&outcome);
        Ok(outcome)
    }

    /// Decide and persist a command inside a transaction the caller owns.
    /// Nothing is written when the command produces no events.
    pub async fn apply_in(
        tx: &mut dyn StoreTransaction,
        mut order: OrderAggregate,
        command: &OrderCommand,
        ctx: &CommandContext,
    ) -> Result<CommandOutcome, OrderError> {
        let expected_version = order.version();
        let previous_status = order.status;

        let events = order.handle_command(command)?;
        if events.is_empty() {
            tracing::debug!(
                order_id = %order.id,
                command = command.name(),
                status = %order.status,
                "Command produced no events"
            );
            return Ok(CommandOutcome { order, previous_status, events });
        }

        let mut envelopes = Vec::with_capacity(events.len());
        let mut seq = expected_version;

        for event in &events {
            order.apply_event(event)?;
            seq += 1;

            let mut envelope = EventEnvelope::new(order.id, seq, event.clone(), ctx.correlation_id)
                .with_user(ctx.actor_id)
                .with_metadata("command", command.name());
            if let Some(causation_id) = ctx.causation_id {
                envelope = envelope.with_causation(causation_id);
            }
            envelopes.push(envelope);
        }
        order.set_version(seq);

        if matches!(command, OrderCommand::Purge { .. }) {
            tx.delete_order(order.id).await?;
        } else {
            tx.update_order(&order, expected_version).await?;
        }
        tx.append_events(&envelopes).await?;

        tracing::info!(
            order_id = %order.id,
            command = command.name(),
            from = %previous_status,
            to = %order.status,
            version = seq,
            "Order command applied"
        );

        Ok(CommandOutcome { order, previous_status, events })
    }

    /// Count a committed outcome.
    pub fn record_outcome(&self, outcome: &CommandOutcome) {
        if outcome.status_changed() {
            self.metrics
                .record_transition(outcome.previous_status.as_str(), outcome.order.status.as_str());
        }
    }
}
