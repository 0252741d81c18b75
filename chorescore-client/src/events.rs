//! Client side of the family change feed.
//!
//! [`EventHub`] keeps one SSE connection open per family and fans its events
//! out on a broadcast channel. Subscribers treat every message as "something
//! in this table changed" and re-query.

use std::time::Duration;

use chorescore_shared::api::{self, ChangeEvent, SSE_EVENT_CHANGE, SSE_EVENT_RESYNC, Table};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::AppError;

const CHANNEL_CAPACITY: usize = 64;
const MAX_BACKOFF_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Change(ChangeEvent),
    /// Events were missed; reload everything.
    Resync,
}

pub struct EventHub {
    tx: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl EventHub {
    /// Spawn the listener. It reconnects with exponential backoff until the
    /// hub is dropped or [`EventHub::shutdown`] is called.
    pub fn connect(
        server_url: &str,
        family_id: &str,
        token: &str,
        table: Option<Table>,
    ) -> Result<Self, AppError> {
        let base = crate::config::normalize_server_url(server_url);
        let url = url::Url::parse(&api::endpoints::events(&base, family_id, token, table))
            .map_err(|e| AppError::Config(format!("invalid server_url: {e}")))?;
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(listen(url, tx.clone(), cancel.child_token()));
        Ok(Self { tx, cancel })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn listen(url: url::Url, tx: broadcast::Sender<ClientEvent>, cancel: CancellationToken) {
    let client = reqwest::Client::new();
    let mut backoff_secs = 1u64;
    loop {
        let attempt = async {
            let resp = client.get(url.clone()).send().await?.error_for_status()?;
            tracing::info!("SSE: connected");
            let mut stream = resp.bytes_stream().eventsource();
            while let Some(ev) = stream.next().await {
                match ev {
                    Ok(msg) => {
                        if let Some(event) = decode(&msg.event, &msg.data)
                            && tx.send(event).is_err()
                        {
                            tracing::trace!("SSE: no subscribers");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "SSE read error");
                        break;
                    }
                }
            }
            Ok::<(), reqwest::Error>(())
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            res = attempt => match res {
                // A clean end still means we lost the feed; anything missed
                // in between has to be reloaded.
                Ok(()) => {
                    tracing::info!("SSE: stream ended");
                    backoff_secs = 1;
                    let _ = tx.send(ClientEvent::Resync);
                }
                Err(e) => tracing::warn!(error = %e, "SSE: connect failed"),
            },
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
        }
        backoff_secs = next_backoff(backoff_secs);
    }
    tracing::debug!("SSE: listener stopped");
}

fn next_backoff(secs: u64) -> u64 {
    std::cmp::min(secs * 2, MAX_BACKOFF_SECS)
}

/// Map one SSE message to a client event. Unknown or malformed messages are
/// dropped.
pub(crate) fn decode(event: &str, data: &str) -> Option<ClientEvent> {
    match event {
        SSE_EVENT_CHANGE => match serde_json::from_str::<ChangeEvent>(data) {
            Ok(ev) => Some(ClientEvent::Change(ev)),
            Err(e) => {
                tracing::warn!(error = %e, "SSE: malformed change event");
                None
            }
        },
        SSE_EVENT_RESYNC => Some(ClientEvent::Resync),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorescore_shared::api::ChangeKind;
    use chorescore_shared::domain::FamilyId;

    #[test]
    fn change_events_decode() {
        let data = r#"{"table":"points_history","family_id":"fam","kind":"insert"}"#;
        assert_eq!(
            decode("change", data),
            Some(ClientEvent::Change(ChangeEvent::new(
                Table::PointsHistory,
                &FamilyId::from("fam"),
                ChangeKind::Insert
            )))
        );
    }

    #[test]
    fn resync_and_noise() {
        assert_eq!(decode("resync", "12"), Some(ClientEvent::Resync));
        assert_eq!(decode("change", "{not json"), None);
        assert_eq!(decode("message", "hello"), None);
        assert_eq!(decode("", ""), None);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut secs = 1;
        let mut seen = vec![];
        for _ in 0..7 {
            secs = next_backoff(secs);
            seen.push(secs);
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30, 30]);
    }
}
