//! Job event stream: `GET /api/events[?job_id=<id>]`.

use crate::server::AppContext;
use crate::state::AppEvent;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use vidsplit_common::JobId;

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/events", get(events_handler))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only forward events for this job
    job_id: Option<JobId>,
}

pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = ctx.state.subscribe();
    let only = query.job_id;

    // Lagged receivers skip what they missed; clients re-sync via /api/jobs.
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .filter(move |event: &AppEvent| only.map_or(true, |id| event.job_id() == id))
        .map(|event| Ok(to_sse(&event)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_sse(event: &AppEvent) -> Event {
    let data = serde_json::to_string(event)
        .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));
    Event::default()
        .event(event.name())
        .id(event.job_id().to_string())
        .data(data)
}
