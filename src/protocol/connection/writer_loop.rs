//! Writer loop (§4.8): the single task per connection that serializes every
//! outbound frame onto the socket, fed by a bounded queue shared by the
//! handler tasks and the client-facing call API.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::error;
use tracing_attributes::instrument;

use super::state::{ConnectionState, ConnectionStateCell};
use crate::protocol::frame::Frame;

/// Runs until `rx` is closed (every sender dropped, meaning the connection is
/// shutting down) or a write fails.
#[instrument(skip_all)]
pub async fn run<W>(mut writer: W, mut rx: mpsc::Receiver<Frame>, state: Arc<ConnectionStateCell>, max_body_size: usize)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = super::write_frame(&mut writer, &frame, max_body_size).await {
            error!(error = %e, "writer loop failed, closing connection");
            state.force(ConnectionState::Closed);
            return;
        }
    }
    let _ = writer.shutdown().await;
    state.force(ConnectionState::Closed);
}
