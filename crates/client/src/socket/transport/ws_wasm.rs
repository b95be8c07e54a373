//! Browser websocket transport using web-sys.

use std::cell::RefCell;
use std::rc::Rc;

use blogchat_shared::{AuthPayload, ChatError, Frame};
use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;
use wasm_bindgen::prelude::*;
use web_sys::{js_sys, CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use super::{TransportChannels, TransportKind};
use crate::config::SocketConfig;
use crate::runtime;
use crate::{log_debug, log_error};

const OPEN_POLL_MS: u64 = 10;

pub(super) async fn connect(
    config: &SocketConfig,
    auth: AuthPayload,
) -> Result<TransportChannels, ChatError> {
    let url = config.websocket_url()?;
    let ws = WebSocket::new(url.as_str())
        .map_err(|e| ChatError::Transport(format!("failed to create websocket: {:?}", e)))?;

    let (in_tx, in_rx) = unbounded::<Frame>();
    let (out_tx, mut out_rx) = unbounded::<Frame>();

    let is_open = Rc::new(RefCell::new(false));
    let failure = Rc::new(RefCell::new(None::<String>));

    let is_open_cb = Rc::clone(&is_open);
    let onopen = Closure::wrap(Box::new(move |_: web_sys::Event| {
        *is_open_cb.borrow_mut() = true;
    }) as Box<dyn FnMut(web_sys::Event)>);
    ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
    onopen.forget();

    let failure_err = Rc::clone(&failure);
    let onerror = Closure::wrap(Box::new(move |_: ErrorEvent| {
        *failure_err.borrow_mut() = Some("websocket error".to_string());
    }) as Box<dyn FnMut(ErrorEvent)>);
    ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    onerror.forget();

    // Closing the incoming channel is how the rest of the client learns the
    // transport died.
    let failure_close = Rc::clone(&failure);
    let in_tx_close = in_tx.clone();
    let onclose = Closure::wrap(Box::new(move |e: CloseEvent| {
        let reason = if e.reason().is_empty() {
            format!("code {}", e.code())
        } else {
            e.reason()
        };
        *failure_close.borrow_mut() = Some(reason);
        in_tx_close.close_channel();
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
    onclose.forget();

    let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
        if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
            let text: String = text.into();
            match serde_json::from_str::<Frame>(&text) {
                Ok(frame) => {
                    let _ = in_tx.unbounded_send(frame);
                }
                Err(err) => log_error!("failed to parse frame: {}", err),
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    // Wait for the socket to open; the caller bounds this with the configured
    // connect timeout.
    loop {
        if *is_open.borrow() {
            break;
        }
        if let Some(reason) = failure.borrow().clone() {
            return Err(ChatError::Transport(reason));
        }
        runtime::sleep(std::time::Duration::from_millis(OPEN_POLL_MS)).await;
    }

    // Credentials go out as the first frame of the handshake.
    let auth_json = serde_json::to_string(&auth.into_frame())?;
    ws.send_with_str(&auth_json)
        .map_err(|e| ChatError::Transport(format!("handshake send failed: {:?}", e)))?;

    // Write pump: outgoing channel -> wire; channel close means local close.
    let ws_for_send = ws.clone();
    runtime::spawn(async move {
        while let Some(frame) = out_rx.next().await {
            if ws_for_send.ready_state() != WebSocket::OPEN {
                log_debug!("websocket no longer open, stopping send pump");
                break;
            }
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if let Err(e) = ws_for_send.send_with_str(&json) {
                        log_error!("websocket send failed: {:?}", e);
                        break;
                    }
                }
                Err(e) => log_error!("failed to encode frame: {}", e),
            }
        }
        let _ = ws_for_send.close();
    });

    Ok(TransportChannels {
        kind: TransportKind::WebSocket,
        outgoing: out_tx,
        incoming: in_rx,
    })
}
