use std::convert::Infallible;

use actix_web::{
    HttpResponse, get,
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    web::{self, Bytes},
};
use futures::{StreamExt, future, stream};
use lanwatch::{Event, Subscription};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{AppError, AppState};

/// Server-sent events: `initialData` first, then live device updates and discoveries
#[get("/api/events")]
pub async fn events_route(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let subscription = state.hub.subscribe(state.store.as_ref()).await?;
    debug!(viewers = state.hub.subscriber_count(), "event viewer connected");
    let initial = encode(&subscription.initial_event())?;

    let body = stream::once(future::ready(Ok::<_, Infallible>(initial))).chain(live_events(subscription));

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(body))
}

fn live_events(subscription: Subscription) -> impl futures::Stream<Item = Result<Bytes, Infallible>> {
    stream::unfold(subscription.receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match encode(&event) {
                    Ok(frame) => return Some((Ok::<_, Infallible>(frame), receiver)),
                    Err(e) => warn!(event = event.name(), "dropping unencodable event: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event viewer lagging, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("event hub closed, ending stream");
                    return None;
                }
            }
        }
    })
}

/// One SSE frame: the event name and its payload as JSON
fn encode(event: &Event) -> Result<Bytes, AppError> {
    let mut value = serde_json::to_value(event)?;
    let data = value.get_mut("data").map(serde_json::Value::take).unwrap_or_default();
    Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", event.name(), serde_json::to_string(&data)?)))
}
