//! The durable relay connection (C1): a hand-rolled WebSocket loop with
//! capped exponential-backoff reconnect, transparent re-subscription, and
//! bounded event deduplication. Event construction, signing, and filters
//! reuse the `nostr` crate; only the transport loop is hand-rolled, since
//! the reconnect/dedup semantics here are load-bearing and a higher-level
//! relay-pool abstraction would hide them.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nostr_sdk::{Event, Filter, RelayMessage, SubscriptionId};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::relay::wire::{self, DedupSet};

const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const DEDUP_CAPACITY: usize = 10_000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RelayClient {
    url: String,
    stream: Option<WsStream>,
    subscriptions: Vec<(SubscriptionId, Vec<Filter>)>,
    dedup: DedupSet,
    backoff: Duration,
}

impl RelayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
            subscriptions: Vec::new(),
            dedup: DedupSet::new(DEDUP_CAPACITY),
            backoff: BACKOFF_MIN,
        }
    }

    /// Connect, retrying with capped doubling backoff until it succeeds.
    pub async fn connect(&mut self) -> Result<()> {
        loop {
            match connect_async(&self.url).await {
                Ok((stream, _response)) => {
                    log::info!("connected to relay {}", self.url);
                    self.stream = Some(stream);
                    self.backoff = BACKOFF_MIN;
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "relay connect to {} failed ({e}); retrying in {:?}",
                        self.url,
                        self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                    self.backoff = (self.backoff * 2).min(BACKOFF_MAX);
                }
            }
        }
    }

    async fn reconnect_and_resubscribe(&mut self) -> Result<()> {
        self.stream = None;
        self.connect().await?;
        let subs = self.subscriptions.clone();
        for (sub_id, filters) in subs {
            self.send_req(&sub_id, &filters).await?;
        }
        Ok(())
    }

    async fn send_req(&mut self, sub_id: &SubscriptionId, filters: &[Filter]) -> Result<()> {
        let frame = wire::encode_req(sub_id, filters);
        let stream = self.stream.as_mut().expect("connected before send_req");
        stream.send(Message::Text(frame)).await?;
        Ok(())
    }

    /// Publish an event. Fails without retry if the underlying send fails;
    /// callers retry at the application layer.
    pub async fn publish(&mut self, event: &Event) -> Result<()> {
        let frame = wire::encode_event(event);
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::MalformedFrame("publish called before connect".to_string())
        })?;
        stream.send(Message::Text(frame)).await?;
        Ok(())
    }

    /// Register (or replace) a subscription and send it immediately.
    /// Subscriptions are replayed in registration order after a reconnect.
    pub async fn subscribe(&mut self, sub_id: SubscriptionId, filters: Vec<Filter>) -> Result<()> {
        self.send_req(&sub_id, &filters).await?;
        if let Some(existing) = self.subscriptions.iter_mut().find(|(id, _)| *id == sub_id) {
            existing.1 = filters;
        } else {
            self.subscriptions.push((sub_id, filters));
        }
        Ok(())
    }

    pub async fn unsubscribe(&mut self, sub_id: &SubscriptionId) -> Result<()> {
        let frame = wire::encode_close(sub_id);
        if let Some(stream) = self.stream.as_mut() {
            stream.send(Message::Text(frame)).await?;
        }
        self.subscriptions.retain(|(id, _)| id != sub_id);
        Ok(())
    }

    /// Block until the next deduplicated `(sub_id, event)` pair arrives,
    /// transparently reconnecting and resubscribing on any transient loss.
    pub async fn next_event(&mut self) -> Result<(SubscriptionId, Event)> {
        loop {
            if self.stream.is_none() {
                self.reconnect_and_resubscribe().await?;
            }
            let stream = self.stream.as_mut().expect("connected above");
            let frame = match stream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    log::warn!("relay read error ({e}), reconnecting");
                    self.stream = None;
                    continue;
                }
                None => {
                    log::warn!("relay stream closed, reconnecting");
                    self.stream = None;
                    continue;
                }
            };

            let message = match wire::decode(&frame) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("dropping malformed relay frame: {e}");
                    continue;
                }
            };

            match message {
                RelayMessage::Event {
                    subscription_id,
                    event,
                } => {
                    if self.dedup.insert_if_new(event.id) {
                        return Ok((subscription_id, (*event).clone()));
                    }
                }
                RelayMessage::Notice(msg) => {
                    log::warn!("relay notice: {msg}");
                }
                RelayMessage::Ok { event_id, status, message } => {
                    if !status {
                        log::warn!("relay rejected {event_id}: {message}");
                    }
                }
                RelayMessage::EndOfStoredEvents(_) => {}
                _ => {}
            }
        }
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_one_to_thirty() {
        let mut backoff = BACKOFF_MIN;
        let mut seen = vec![backoff];
        for _ in 0..8 {
            backoff = (backoff * 2).min(BACKOFF_MAX);
            seen.push(backoff);
        }
        assert_eq!(seen.first(), Some(&Duration::from_secs(1)));
        assert_eq!(seen.last(), Some(&BACKOFF_MAX));
        assert!(seen.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn new_client_has_no_subscriptions() {
        let client = RelayClient::new("ws://127.0.0.1:7777");
        assert!(client.subscriptions.is_empty());
    }
}
