// File: src/api/sse.rs
//
// SSE fan-out: one filtered bus subscription per connected client, framed
// as `data: {json}` messages with periodic keep-alive comments

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

use defense_engine_core::bus::{EventBus, SubscriberKind, WILDCARD};
use defense_engine_core::event::EventEnvelope;
use defense_engine_core::runtime::EngineRuntime;

use crate::monitoring::metrics;

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    #[serde(rename = "gameId")]
    pub game_id: Option<String>,
    #[serde(rename = "eventType")]
    pub event_type: Option<String>,
}

/// Client-supplied filter applied before a frame is written.
pub struct EventFilter {
    game_id: Option<String>,
}

impl EventFilter {
    pub fn new(game_id: Option<String>) -> Self {
        Self { game_id }
    }

    /// An event belongs to a game when its payload carries the id or the
    /// aggregate itself is the game.
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        match &self.game_id {
            None => true,
            Some(game_id) => {
                if event.aggregate_id.to_string() == *game_id {
                    return true;
                }
                payload_game_id(&event.payload).map_or(false, |id| id == game_id)
            }
        }
    }
}

/// Find a `gameId` field at the payload's top level or, for tagged domain
/// unions, inside the variant's `data` object.
fn payload_game_id(payload: &serde_json::Value) -> Option<&str> {
    payload
        .get("gameId")
        .or_else(|| payload.get("data").and_then(|data| data.get("gameId")))
        .and_then(|v| v.as_str())
}

pub fn data_frame(event: &EventEnvelope) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {}\n\n", json)),
        Err(e) => Bytes::from(format!(
            "event: error\ndata: {{\"error\": \"serialization failed: {}\"}}\n\n",
            e
        )),
    }
}

pub fn keepalive_frame() -> Bytes {
    Bytes::from_static(b": keep-alive\n\n")
}

/// Final frame before the server closes a connection it can no longer
/// serve; the client is expected to reconnect.
pub fn close_frame(reason: &str) -> Bytes {
    Bytes::from(format!("event: close\ndata: {{\"reason\": \"{}\"}}\n\n", reason))
}

/// Removes the bus subscription when the client connection goes away.
struct SubscriptionGuard {
    bus: Arc<EventBus>,
    subscription: Uuid,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        metrics::SSE_CONNECTIONS_ACTIVE.dec();
        let bus = Arc::clone(&self.bus);
        let subscription = self.subscription;
        tokio::spawn(async move {
            bus.unsubscribe(subscription).await;
        });
    }
}

/// GET /events/subscribe?gameId=…&eventType=…
pub async fn handle_subscribe(
    runtime: web::Data<Arc<EngineRuntime>>,
    query: web::Query<SubscribeQuery>,
) -> HttpResponse {
    let query = query.into_inner();
    let event_types = vec![query.event_type.clone().unwrap_or_else(|| WILDCARD.to_string())];
    let filter = EventFilter::new(query.game_id.clone());

    let client = query
        .game_id
        .as_deref()
        .map(|id| format!("sse:{}", id))
        .unwrap_or_else(|| "sse:all".to_string());

    let bus = Arc::clone(&runtime.bus);
    let (subscription, mut receiver) = bus
        .subscribe_channel(
            client,
            SubscriberKind::Transport,
            event_types,
            runtime.config.bus.queue_capacity,
        )
        .await;

    metrics::SSE_CONNECTIONS_ACTIVE.inc();
    let guard = SubscriptionGuard { bus, subscription };
    let keepalive = runtime.config.sse_keepalive();

    let stream = async_stream::stream! {
        // Owned by the stream: dropped (and unsubscribed) with it.
        let _guard = guard;
        let mut ticker = tokio::time::interval(keepalive);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                received = receiver.recv() => {
                    match received {
                        Some(event) => {
                            if filter.matches(&event) {
                                yield Ok::<Bytes, actix_web::Error>(data_frame(&event));
                            }
                        }
                        None => {
                            // The bus shed this subscription as slow (or is
                            // shutting down); tell the client to reconnect.
                            yield Ok(close_frame("subscription-closed"));
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    yield Ok(keepalive_frame());
                }
            }
        }
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .insert_header(("Access-Control-Allow-Origin", "*"))
        .streaming(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tower_event(game_id: &str) -> EventEnvelope {
        EventEnvelope::new(
            Uuid::new_v4(),
            "game",
            "tower_placed",
            1,
            json!({"gameId": game_id, "x": 3, "y": 4}),
        )
    }

    #[test]
    fn filter_isolates_games() {
        let filter = EventFilter::new(Some("g1".to_string()));
        assert!(filter.matches(&tower_event("g1")));
        assert!(!filter.matches(&tower_event("g2")));

        let unfiltered = EventFilter::new(None);
        assert!(unfiltered.matches(&tower_event("g2")));
    }

    #[test]
    fn filter_reads_tagged_union_payloads() {
        // Domain unions serialize as {"type": …, "data": {…}}; the game id
        // lives inside the variant body.
        let event = EventEnvelope::new(
            Uuid::new_v4(),
            "game",
            "tower_placed",
            1,
            json!({"type": "tower_placed", "data": {"gameId": "g7", "x": 1, "y": 2}}),
        );
        let filter = EventFilter::new(Some("g7".to_string()));
        assert!(filter.matches(&event));
        assert!(!EventFilter::new(Some("g8".to_string())).matches(&event));
    }

    #[test]
    fn filter_accepts_the_game_aggregate_itself() {
        let event = tower_event("other");
        let filter = EventFilter::new(Some(event.aggregate_id.to_string()));
        assert!(filter.matches(&event));
    }

    #[test]
    fn frames_are_sse_shaped() {
        let event = tower_event("g1");
        let frame = data_frame(&event);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"gameId\":\"g1\""));

        assert_eq!(keepalive_frame(), Bytes::from_static(b": keep-alive\n\n"));
        let close = close_frame("subscription-closed");
        assert!(std::str::from_utf8(&close).unwrap().starts_with("event: close\n"));
    }
}
