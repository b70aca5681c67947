//! Reader loop (§4.8): the single task per connection that parses frames off
//! the socket and routes each one to the right call, spawning a fresh task to
//! serve every inbound `CallReq`.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_attributes::instrument;

use super::state::{ConnectionState, ConnectionStateCell};
use crate::config::PeerConfig;
use crate::error::WireErrorCode;
use crate::handler::{self, Handler};
use crate::protocol::frame::{Frame, FrameType};
use crate::protocol::message::ErrorPayload;
use crate::protocol::registry::{CallRegistry, DispatchOutcome};

/// Runs until the socket closes or a connection-fatal error is hit, routing
/// every frame that arrives to the appropriate registry or spawning a handler
/// task for a new inbound call.
#[instrument(skip_all)]
pub async fn run<R>(
    mut reader: R,
    state: Arc<ConnectionStateCell>,
    inbound_registry: Arc<CallRegistry>,
    outbound_registry: Arc<CallRegistry>,
    config: Arc<PeerConfig>,
    handler: Arc<dyn Handler>,
    write_tx: mpsc::Sender<Frame>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match super::read_frame(&mut reader, config.max_body_size).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "reader loop ending");
                break;
            }
        };

        if frame.is_connection_fatal_error() {
            warn!("peer sent a connection-fatal error frame");
            break;
        }

        match frame.frame_type {
            FrameType::CallReq => {
                if state.get() != ConnectionState::Active {
                    send_error(&write_tx, frame.id, WireErrorCode::Declined, "connection is closing").await;
                    continue;
                }
                let id = frame.id;
                match inbound_registry.register(id, config.call_queue_depth) {
                    Ok(rx) => {
                        if inbound_registry.dispatch(frame) != DispatchOutcome::Delivered {
                            inbound_registry.remove(id);
                            continue;
                        }
                        tokio::spawn(handler::serve_call(
                            id,
                            rx,
                            write_tx.clone(),
                            handler.clone(),
                            config.clone(),
                            inbound_registry.clone(),
                        ));
                    }
                    Err(_) => warn!(call_id = id, "duplicate CallReq id from peer, dropping"),
                }
            }
            FrameType::CallReqCont => {
                let id = frame.id;
                if inbound_registry.dispatch(frame) == DispatchOutcome::Busy {
                    inbound_registry.remove(id);
                    send_error(&write_tx, id, WireErrorCode::Busy, "inbound call queue overflow").await;
                }
            }
            FrameType::CallRes | FrameType::CallResCont => {
                outbound_registry.dispatch(frame);
            }
            FrameType::Error => {
                let id = frame.id;
                if outbound_registry.dispatch(frame.clone()) == DispatchOutcome::Unknown {
                    inbound_registry.dispatch(frame);
                }
            }
            FrameType::InitReq | FrameType::InitRes => {
                warn!("InitReq/InitRes received after handshake completed");
                break;
            }
        }
    }

    state.force(ConnectionState::InboundClosed);
}

async fn send_error(write_tx: &mpsc::Sender<Frame>, id: u32, code: WireErrorCode, message: &str) {
    if let Ok(payload) = ErrorPayload::new(code, id, message).encode() {
        let _ = write_tx.send(Frame::new(id, FrameType::Error, payload)).await;
    }
}
