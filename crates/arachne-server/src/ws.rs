//! WebSocket progress-streaming sessions.
//!
//! Close codes: 1000 normal completion, 1008 crawl not found, 3000
//! unauthenticated, 3003 foreign team, 1011 unexpected (reason carries an
//! exception id).

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use arachne_core::credits::AuthContext;
use arachne_core::error::AppError;
use arachne_core::streamer::{CrawlWatcher, Frame, FrameSink};

use crate::error::log_exception;
use crate::state::AppState;

/// Frame sink over the write half of an axum WebSocket.
struct WsFrameSink {
    sender: SplitSink<WebSocket, Message>,
}

impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: Frame) -> Result<(), AppError> {
        let text = serde_json::to_string(&frame)?;
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| AppError::Unexpected(format!("WebSocket send failed: {e}")))
    }
}

/// Drive one streaming session to completion.
pub async fn handle_session(
    state: Arc<AppState>,
    socket: WebSocket,
    crawl_id: Uuid,
    auth: Result<AuthContext, AppError>,
) {
    let (sender, receiver) = socket.split();
    let mut sink = WsFrameSink { sender };

    let auth = match auth {
        Ok(auth) => auth,
        Err(_) => {
            close(&mut sink, 3000, "Unauthorized").await;
            return;
        }
    };

    // Client disconnect terminates the poll loop at the next iteration
    // boundary.
    let cancel = CancellationToken::new();
    let reader = tokio::spawn(watch_disconnect(receiver, cancel.clone()));

    let watcher = CrawlWatcher::new(state.db.job_queue(), state.db.crawl_store());
    let result = watcher
        .run(crawl_id, &auth.team_id, &mut sink, cancel.clone())
        .await;

    cancel.cancel();
    reader.abort();

    match result {
        Ok(()) => close(&mut sink, 1000, "").await,
        Err(AppError::CrawlNotFound) => {
            send_error(&mut sink, "Job not found").await;
            close(&mut sink, 1008, "Job not found").await;
        }
        Err(AppError::ForbiddenTeam) => {
            send_error(&mut sink, "Forbidden").await;
            close(&mut sink, 3003, "Forbidden").await;
        }
        Err(err) => {
            let exception_id = log_exception(&err);
            let message = format!("An unexpected error occurred (exception {exception_id})");
            send_error(&mut sink, &message).await;
            close(&mut sink, 1011, &exception_id.to_string()).await;
        }
    }
}

async fn watch_disconnect(mut receiver: SplitStream<WebSocket>, cancel: CancellationToken) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    cancel.cancel();
}

async fn send_error(sink: &mut WsFrameSink, error: &str) {
    let _ = sink
        .send(Frame::Error {
            error: error.to_string(),
        })
        .await;
}

async fn close(sink: &mut WsFrameSink, code: u16, reason: &str) {
    let _ = sink
        .sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}
