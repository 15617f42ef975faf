use anyhow::Result;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde_json::json;
use shared::NotificationKind;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

use crate::models::*;
use crate::pg_store::DbPool;
use crate::schema::*;

/// Where each notification kind is published.
#[derive(Debug, Clone)]
pub struct Topics {
    pub notifications: String,
    pub inquiries: String,
}

impl Topics {
    pub fn topic_for(&self, event_type: &str) -> &str {
        if event_type == NotificationKind::InquiryReceived.as_str() {
            &self.inquiries
        } else {
            &self.notifications
        }
    }
}

/// Message body published for one outbox row. Consumers (mailers) key on
/// `event_type`.
pub fn envelope(event: &DbOutboxEvent) -> serde_json::Value {
    json!({
        "event_id": event.id,
        "event_type": event.event_type,
        "aggregate_id": event.aggregate_id,
        "created_at": event.created_at,
        "data": event.event_data,
    })
}

/// Relays notifications written alongside state changes to Kafka. Delivery
/// is at-least-once; a row is marked processed only after the broker acks.
pub struct OutboxProcessor {
    pool: DbPool,
    producer: FutureProducer,
    topics: Topics,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, producer: FutureProducer, topics: Topics) -> Self {
        Self { pool, producer, topics }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;

            if let Err(e) = self.process_outbox_events().await {
                error!("Error processing outbox events: {}", e);
            }
        }
    }

    async fn process_outbox_events(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let unprocessed_events = outbox_events::table
            .filter(outbox_events::processed.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(100)
            .load::<DbOutboxEvent>(&mut conn)
            .await?;

        for event in unprocessed_events {
            if let Err(e) = self.publish_event(&event).await {
                error!("Failed to publish {} {}: {}", event.event_type, event.id, e);
                continue;
            }

            diesel::update(outbox_events::table.filter(outbox_events::id.eq(event.id)))
                .set(outbox_events::processed.eq(true))
                .execute(&mut conn)
                .await?;

            info!("Published {} for {}", event.event_type, event.aggregate_id);
        }

        Ok(())
    }

    async fn publish_event(&self, event: &DbOutboxEvent) -> Result<()> {
        let topic = self.topics.topic_for(&event.event_type);
        let json = serde_json::to_string(&envelope(event))?;
        let key = event.aggregate_id.to_string();
        let record = FutureRecord::to(topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}
