//! `GET /progress/{downloadId}` (SSE) and its plain-JSON snapshot sibling,
//! plus `POST /download/{downloadId}/cancel` (spec §4.3, §6 wire format).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use pipeline_core::{DownloadSession, ProgressEvent};
use tokio::sync::broadcast::error::RecvError;

use super::queue::Ack;
use crate::error::ApiError;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub async fn stream(State(state): State<AppState>, Path(download_id): Path<String>) -> Result<Response, ApiError> {
    let Some((mut rx, replay)) = state.bus.subscribe(&download_id) else {
        return Err(ApiError::NotFound(format!("unknown download: {download_id}")));
    };

    let sse_stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(async_stream::stream! {
        yield Ok(connected_event(&download_id));
        if let Some(event) = replay {
            let already_terminal = matches!(&event, ProgressEvent::Progress { status, .. } if status.is_terminal());
            yield Ok(data_event(&event));
            if already_terminal {
                return;
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        let terminal = matches!(&event, ProgressEvent::Progress { status, .. } if status.is_terminal());
                        yield Ok(data_event(&event));
                        if terminal {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = heartbeat.tick() => {
                    yield Ok(data_event(&ProgressEvent::Heartbeat));
                }
            }
        }
    });

    let sse = Sse::new(sse_stream).keep_alive(KeepAlive::default());
    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert("Cache-Control", "no-cache".parse().unwrap());
    headers.insert("Connection", "keep-alive".parse().unwrap());
    headers.insert("X-Accel-Buffering", "no".parse().unwrap());
    Ok(response)
}

fn connected_event(download_id: &str) -> Event {
    let event = ProgressEvent::Connected { download_id: download_id.to_string() };
    Event::default().json_data(&event).unwrap_or_default()
}

fn data_event(event: &ProgressEvent) -> Event {
    Event::default().json_data(event).unwrap_or_default()
}

pub async fn status(State(state): State<AppState>, Path(download_id): Path<String>) -> Result<Json<DownloadSession>, ApiError> {
    state
        .bus
        .get_progress(&download_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown download: {download_id}")))
}

pub async fn cancel(State(state): State<AppState>, Path(download_id): Path<String>) -> Result<Json<Ack>, ApiError> {
    if !state.bus.cancel(&download_id) {
        return Err(ApiError::NotFound(format!("unknown or already-terminal download: {download_id}")));
    }
    Ok(Json(Ack { ok: true }))
}
