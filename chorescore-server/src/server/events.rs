//! Change feed: handlers publish a [`ChangeEvent`] after each committed write
//! and SSE subscribers re-query whatever the event names.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chorescore_shared::api::{ChangeEvent, SSE_EVENT_CHANGE, SSE_EVENT_RESYNC, Table};
use chorescore_shared::domain::FamilyId;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::{AppError, AppState, auth};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // Err only means nobody is listening right now.
        if self.tx.send(event).is_err() {
            tracing::trace!("events: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    token: String,
    table: Option<Table>,
}

pub async fn family_events(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Query(q): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let claims = auth::verify_token(&state, &q.token).await?;
    if claims.family_id.as_deref() != Some(family_id.as_str()) {
        tracing::warn!(
            profile_id = %claims.sub,
            token_family = ?claims.family_id,
            requested = %family_id,
            "events: family mismatch"
        );
        return Err(AppError::forbidden());
    }
    let family = FamilyId(family_id);
    let table = q.table;
    tracing::debug!(
        profile_id = %claims.sub,
        family_id = %family,
        ?table,
        "events: subscriber attached"
    );

    let stream = BroadcastStream::new(state.events.subscribe())
        .filter_map(move |msg| {
            let out = to_sse_event(msg, &family, table);
            async move { out.map(Ok) }
        })
        .take_until(state.shutdown_token().cancelled_owned());

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Maps one bus message to what a subscriber sees. A lagged receiver gets a
/// `resync` event, which tells it to re-query everything.
fn to_sse_event(
    msg: Result<ChangeEvent, BroadcastStreamRecvError>,
    family: &FamilyId,
    table: Option<Table>,
) -> Option<Event> {
    match msg {
        Ok(ev) if ev.matches(family, table) => {
            match Event::default().event(SSE_EVENT_CHANGE).json_data(&ev) {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::error!(error = %err, "events: failed to encode change event");
                    None
                }
            }
        }
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, family_id = %family, "events: subscriber lagged");
            Some(
                Event::default()
                    .event(SSE_EVENT_RESYNC)
                    .data(skipped.to_string()),
            )
        }
    }
}
