//! Server-Sent Events change feed for the dashboard

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};

use super::AuthenticatedUser;

/// Stream book, reservation and user changes
///
/// Each `change` event carries a JSON `ChangeEvent`. A `lagged` event tells
/// the client it missed updates and should reload.
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "text/event-stream of changes", body = crate::services::notifier::ChangeEvent, content_type = "text/event-stream"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn change_feed(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("{} subscribed to the change feed", claims.sub);

    let stream = BroadcastStream::new(state.services.notifier.subscribe()).filter_map(|message| {
        match message {
            Ok(change) => match Event::default().event("change").json_data(&change) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::warn!("Could not encode change event: {}", e);
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(missed)) => Some(Ok(Event::default()
                .event("lagged")
                .data(missed.to_string()))),
        }
    });

    let keep_alive = Duration::from_secs(state.config.events.keep_alive_seconds.max(1));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive))
}
