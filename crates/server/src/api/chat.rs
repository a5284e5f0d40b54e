//! `POST /{project}/chat/completions`: OpenAI-compatible chat completions
//! answered by the project's primary agent.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use threadgate_core::chat::{ChatCompletion, ChatRequest, ErrorResponse};
use threadgate_core::BridgeError;

use crate::aggregator::HandoffItem;
use crate::bridge::Exchange;
use crate::state::AppState;

use super::{api_error, ApiError};

const SENTINEL: &str = "[DONE]";

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|rejection| reject(&BridgeError::invalid(rejection.body_text())))?;
    let content = request.prompt_text().map_err(|e| reject(&e))?;

    let exchange = state
        .bridge
        .open(&project, &request.model, &content)
        .await
        .map_err(|e| reject(&e))?;

    if request.stream {
        Ok(Sse::new(sse_events(exchange.rx))
            .keep_alive(KeepAlive::new().interval(state.keep_alive))
            .into_response())
    } else {
        collect(exchange).await.map(IntoResponse::into_response)
    }
}

fn reject(err: &BridgeError) -> ApiError {
    if err.status_code() >= 500 {
        warn!(error = %err, "chat completion failed");
    } else {
        debug!(error = %err, "chat completion rejected");
    }
    api_error(err)
}

/// Wait for the whole reply and answer with a single `chat.completion`.
async fn collect(mut exchange: Exchange) -> Result<Json<ChatCompletion>, ApiError> {
    let mut content = String::new();
    while let Some(item) = exchange.rx.recv().await {
        match item {
            HandoffItem::Chunk(chunk) => {
                if let Some(text) = chunk.content_delta() {
                    content.push_str(text);
                }
                if chunk.is_terminal() {
                    return Ok(Json(ChatCompletion::new(&exchange.header, content)));
                }
            }
            HandoffItem::Failed(err) => return Err(reject(&err)),
        }
    }
    Err(reject(&vanished()))
}

enum Phase {
    Open(mpsc::Receiver<HandoffItem>),
    Sentinel,
    Done,
}

/// Chunks as `data:` events. Whatever happens, the last event is `[DONE]`.
fn sse_events(rx: mpsc::Receiver<HandoffItem>) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(Phase::Open(rx), |phase| async move {
        match phase {
            Phase::Open(mut rx) => {
                let item = rx.recv().await;
                let (event, next) = match item {
                    Some(HandoffItem::Chunk(chunk)) => {
                        let next = if chunk.is_terminal() {
                            Phase::Sentinel
                        } else {
                            Phase::Open(rx)
                        };
                        (data(&chunk), next)
                    }
                    Some(HandoffItem::Failed(err)) => {
                        debug!(error = %err, "stream ended with error");
                        (data(&ErrorResponse::from(&err)), Phase::Sentinel)
                    }
                    None => {
                        let err = vanished();
                        warn!(error = %err, "exchange ended without a terminal item");
                        (data(&ErrorResponse::from(&err)), Phase::Sentinel)
                    }
                };
                Some((Ok(event), next))
            }
            Phase::Sentinel => Some((Ok(Event::default().data(SENTINEL)), Phase::Done)),
            Phase::Done => None,
        }
    })
}

fn data<T: Serialize>(value: &T) -> Event {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(json)
}

fn vanished() -> BridgeError {
    BridgeError::Internal("response stream ended unexpectedly".into())
}
