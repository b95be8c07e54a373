//! HTTP long-polling fallback transport.
//!
//! The backend keeps a server-side session per polling client:
//!
//! - `POST {base}/poll/open` with the auth payload opens a session and
//!   returns `{ "session": <id> }`.
//! - `GET {base}/poll/{session}` parks until frames are available (or a
//!   server-side idle deadline passes) and returns a JSON array of frames.
//! - `POST {base}/poll/{session}` delivers one outbound frame.
//! - `DELETE {base}/poll/{session}` closes the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blogchat_shared::{AuthPayload, ChatError, Frame};
use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;
use serde::Deserialize;

use super::{TransportChannels, TransportKind};
use crate::config::SocketConfig;
use crate::runtime;
use crate::{log_debug, log_error};

#[derive(Deserialize)]
struct OpenResponse {
    session: String,
}

pub(super) async fn connect(
    config: &SocketConfig,
    auth: AuthPayload,
) -> Result<TransportChannels, ChatError> {
    let base = config.polling_url()?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/open", base))
        .json(&auth)
        .send()
        .await
        .map_err(|e| ChatError::Transport(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ChatError::Transport(format!(
            "poll open refused: {}",
            response.status()
        )));
    }
    let OpenResponse { session } = response
        .json()
        .await
        .map_err(|e| ChatError::Transport(e.to_string()))?;

    let session_url = format!("{}/{}", base, session);
    let closed = Arc::new(AtomicBool::new(false));

    let (in_tx, in_rx) = unbounded::<Frame>();
    let (out_tx, mut out_rx) = unbounded::<Frame>();

    // Receive pump: repeated long polls until the session dies.
    let poll_client = client.clone();
    let poll_url = session_url.clone();
    let poll_closed = Arc::clone(&closed);
    runtime::spawn(async move {
        loop {
            if poll_closed.load(Ordering::SeqCst) {
                break;
            }
            let response = match poll_client.get(&poll_url).send().await {
                Ok(r) => r,
                Err(e) => {
                    log_error!("poll receive failed: {}", e);
                    break;
                }
            };
            if response.status() == reqwest::StatusCode::NO_CONTENT {
                continue;
            }
            if !response.status().is_success() {
                log_debug!("poll session ended: {}", response.status());
                break;
            }
            let frames: Vec<Frame> = match response.json().await {
                Ok(frames) => frames,
                Err(e) => {
                    log_error!("failed to parse poll batch: {}", e);
                    break;
                }
            };
            for frame in frames {
                if in_tx.unbounded_send(frame).is_err() {
                    return;
                }
            }
        }
    });

    // Send pump: outgoing channel -> session; channel close tears the
    // session down.
    runtime::spawn(async move {
        while let Some(frame) = out_rx.next().await {
            if let Err(e) = client.post(&session_url).json(&frame).send().await {
                log_error!("poll send failed: {}", e);
                break;
            }
        }
        closed.store(true, Ordering::SeqCst);
        let _ = client.delete(&session_url).send().await;
    });

    Ok(TransportChannels {
        kind: TransportKind::Polling,
        outgoing: out_tx,
        incoming: in_rx,
    })
}
