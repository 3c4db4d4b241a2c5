// File: src/bus/mod.rs
//
// In-process event bus: per-subscription bounded queues with serialized
// delivery workers, publisher backpressure, and slow-subscriber shedding

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::BusSettings;
use crate::context::RequestContext;
use crate::error::EngineResult;
use crate::event::EventEnvelope;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Subscribe to every event type.
pub const WILDCARD: &str = "*";

/// What a subscriber is, for diagnostics and delivery accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberKind {
    Projection,
    Reactor,
    Transport,
}

/// Handler invoked by a subscription's delivery worker.
///
/// Each subscription gets one worker, so a handler never sees two events
/// concurrently; combined with in-order publishing this preserves
/// per-aggregate version order for every subscriber.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> SubscriberKind;

    async fn handle(&self, ctx: &RequestContext, event: &EventEnvelope) -> EngineResult<()>;
}

/// Introspection snapshot of one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub id: Uuid,
    pub name: String,
    pub kind: SubscriberKind,
    pub event_types: Vec<String>,
    pub delivered: u64,
    pub errors: u64,
}

struct EventTypeMatcher {
    all: bool,
    types: HashSet<String>,
}

impl EventTypeMatcher {
    fn new(event_types: &[String]) -> Self {
        let all = event_types.iter().any(|t| t == WILDCARD);
        Self {
            all,
            types: event_types.iter().cloned().collect(),
        }
    }

    fn matches(&self, event: &EventEnvelope) -> bool {
        self.all || self.types.contains(&event.event_type)
    }
}

struct SubscriptionEntry {
    id: Uuid,
    name: String,
    kind: SubscriberKind,
    event_types: Vec<String>,
    matcher: EventTypeMatcher,
    sender: mpsc::Sender<EventEnvelope>,
    worker: Option<JoinHandle<()>>,
    delivered: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

/// In-process publish/subscribe hub between the repository, projections,
/// reactors, and transports.
pub struct EventBus {
    settings: BusSettings,
    telemetry: TelemetrySink,
    subscriptions: RwLock<HashMap<Uuid, SubscriptionEntry>>,
}

impl EventBus {
    pub fn new(settings: BusSettings, telemetry: TelemetrySink) -> Self {
        Self {
            settings,
            telemetry,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler-backed subscription and spawn its delivery worker.
    pub async fn subscribe(
        &self,
        event_types: Vec<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let name = handler.name().to_string();
        let kind = handler.kind();
        let (sender, mut receiver) = mpsc::channel::<EventEnvelope>(self.settings.queue_capacity);
        let delivered = Arc::new(AtomicU64::new(0));
        let errors = Arc::new(AtomicU64::new(0));

        let worker = {
            let delivered = Arc::clone(&delivered);
            let errors = Arc::clone(&errors);
            let worker_name = name.clone();
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    let ctx = RequestContext::background();
                    match handler.handle(&ctx, &event).await {
                        Ok(()) => {
                            delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(
                                subscription = %worker_name,
                                event_id = %event.event_id,
                                event_type = %event.event_type,
                                %error,
                                "subscriber failed to process event"
                            );
                        }
                    }
                }
            })
        };

        let entry = SubscriptionEntry {
            id,
            name,
            kind,
            matcher: EventTypeMatcher::new(&event_types),
            event_types,
            sender,
            worker: Some(worker),
            delivered,
            errors,
        };

        self.subscriptions.write().await.insert(id, entry);
        id
    }

    /// Register a raw channel subscription for transports that pump the
    /// queue themselves (SSE). Delivery accounting is the caller's business.
    pub async fn subscribe_channel(
        &self,
        name: impl Into<String>,
        kind: SubscriberKind,
        event_types: Vec<String>,
        capacity: usize,
    ) -> (Uuid, mpsc::Receiver<EventEnvelope>) {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let entry = SubscriptionEntry {
            id,
            name: name.into(),
            kind,
            matcher: EventTypeMatcher::new(&event_types),
            event_types,
            sender,
            worker: None,
            delivered: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        };
        self.subscriptions.write().await.insert(id, entry);
        (id, receiver)
    }

    /// Deliver one event to every matching subscription, in registration
    /// order. Blocks while a queue is full; a queue that stays full past the
    /// publish timeout gets its subscription dropped to protect publishers.
    pub async fn publish(&self, ctx: &RequestContext, event: &EventEnvelope) -> EngineResult<()> {
        ctx.ensure_active()?;

        let targets: Vec<(Uuid, String, mpsc::Sender<EventEnvelope>)> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .values()
                .filter(|entry| entry.matcher.matches(event))
                .map(|entry| (entry.id, entry.name.clone(), entry.sender.clone()))
                .collect()
        };

        let mut shed: Vec<(Uuid, String, &'static str)> = Vec::new();
        for (id, name, sender) in targets {
            let send = sender.send(event.clone());
            match tokio::time::timeout(self.settings.publish_timeout(), send).await {
                Ok(Ok(())) => {}
                Ok(Err(_closed)) => shed.push((id, name, "receiver dropped")),
                Err(_elapsed) => shed.push((id, name, "queue overflow")),
            }
        }

        for (id, name, reason) in shed {
            self.shed_subscription(id, &name, reason).await;
        }

        Ok(())
    }

    /// Remove a subscription; its worker drains and exits once the queue is
    /// empty.
    pub async fn unsubscribe(&self, id: Uuid) -> bool {
        self.subscriptions.write().await.remove(&id).is_some()
    }

    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let subscriptions = self.subscriptions.read().await;
        let mut infos: Vec<SubscriptionInfo> = subscriptions
            .values()
            .map(|entry| SubscriptionInfo {
                id: entry.id,
                name: entry.name.clone(),
                kind: entry.kind,
                event_types: entry.event_types.clone(),
                delivered: entry.delivered.load(Ordering::Relaxed),
                errors: entry.errors.load(Ordering::Relaxed),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn start(&self, ctx: &RequestContext) -> EngineResult<()> {
        ctx.ensure_active()?;
        Ok(())
    }

    /// Close every subscription and wait for workers to drain, bounded by
    /// the shutdown grace period.
    pub async fn stop(&self, _ctx: &RequestContext) -> EngineResult<()> {
        let entries: Vec<SubscriptionEntry> = {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.drain().map(|(_, entry)| entry).collect()
        };

        for mut entry in entries {
            drop(entry.sender);
            if let Some(worker) = entry.worker.take() {
                if tokio::time::timeout(self.settings.shutdown_grace(), worker)
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        subscription = %entry.name,
                        "subscriber did not drain within shutdown grace"
                    );
                }
            }
        }
        Ok(())
    }

    async fn shed_subscription(&self, id: Uuid, name: &str, reason: &str) {
        let removed = {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.remove(&id)
        };
        if let Some(entry) = removed {
            // Dropping the entry closes the sender; the detached worker
            // finishes whatever is queued, then exits.
            drop(entry);
            tracing::warn!(subscription = name, reason, "dropped slow subscription");
            self.telemetry.emit(TelemetryEvent::SubscriptionDropped {
                subscription: name.to_string(),
                reason: reason.to_string(),
            });
        }
    }
}
