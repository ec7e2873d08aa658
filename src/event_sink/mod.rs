//! EventSink - outbound alert events
//!
//! ## Responsibilities
//!
//! - Single `emit_event` seam for whatever consumes alerts
//! - In-process ring buffer for queries
//! - MySQL `detection_events` table when a database is configured

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Event handed to sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkEvent {
    pub camera_id: String,
    pub event_type: String,
    pub subject_track_id: Option<String>,
    pub confidence: Option<f64>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit_event(&self, event: &SinkEvent) -> Result<()>;
}

/// Logged event with its buffer id
#[derive(Debug, Clone, Serialize)]
pub struct LoggedEvent {
    pub event_id: u64,
    #[serde(flatten)]
    pub event: SinkEvent,
}

struct EventRingBuffer {
    events: VecDeque<LoggedEvent>,
    capacity: usize,
    next_id: u64,
}

impl EventRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_id: 1,
        }
    }

    fn push(&mut self, event: SinkEvent) -> u64 {
        let event_id = self.next_id;
        self.next_id += 1;

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(LoggedEvent { event_id, event });
        event_id
    }

    fn latest(&self, count: usize, camera_id: Option<&str>) -> Vec<LoggedEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| camera_id.map_or(true, |c| e.event.camera_id == c))
            .take(count)
            .cloned()
            .collect()
    }
}

/// Ring buffer sink
pub struct EventLogSink {
    buffer: RwLock<EventRingBuffer>,
}

impl EventLogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(EventRingBuffer::new(capacity)),
        }
    }

    /// Newest first, optionally for one camera
    pub async fn latest(&self, count: usize, camera_id: Option<&str>) -> Vec<LoggedEvent> {
        self.buffer.read().await.latest(count, camera_id)
    }

    pub async fn count(&self) -> usize {
        self.buffer.read().await.events.len()
    }
}

impl Default for EventLogSink {
    fn default() -> Self {
        Self::new(2000)
    }
}

#[async_trait]
impl EventSink for EventLogSink {
    async fn emit_event(&self, event: &SinkEvent) -> Result<()> {
        let id = self.buffer.write().await.push(event.clone());
        tracing::debug!(event_id = id, camera_id = %event.camera_id, event_type = %event.event_type, "Event logged");
        Ok(())
    }
}

/// MySQL sink
#[derive(Clone)]
pub struct MySqlEventSink {
    pool: MySqlPool,
}

impl MySqlEventSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSink for MySqlEventSink {
    async fn emit_event(&self, event: &SinkEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO detection_events
                (camera_id, event_type, subject_track_id, confidence, description, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.camera_id)
        .bind(&event.event_type)
        .bind(&event.subject_track_id)
        .bind(event.confidence)
        .bind(&event.description)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Delivers to every inner sink; one failing sink does not block the others
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn emit_event(&self, event: &SinkEvent) -> Result<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.emit_event(event).await {
                tracing::error!(camera_id = %event.camera_id, error = %e, "Event sink failed");
            }
        }
        Ok(())
    }
}
