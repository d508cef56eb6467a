//! WebSocket transport for the control channel.

use alloc::sync::Arc;
use core::{future::Future, time::Duration};

use futures::{SinkExt as _, StreamExt as _};
use linkshift_common::{Envelope, NODE_ID_HEADER};
use secrecy::{ExposeSecret as _, SecretString};
use tokio::{sync::mpsc, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest as _,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{Instrument as _, debug, warn};

use super::ControlError;

/// Capacity of the per-session event queues.
const SESSION_QUEUE: usize = 64;

/// One established connection: events to send and events received.
///
/// The inbound receiver yields `None` once the connection is gone.
#[derive(Debug)]
pub struct Session {
    pub outbound: mpsc::Sender<Envelope>,
    pub inbound: mpsc::Receiver<Envelope>,
}

/// Establishes control-channel sessions.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<Session, ControlError>> + Send;
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    node_id: u32,
    token: Option<Arc<SecretString>>,
    connect_timeout: Duration,
}

impl WsConnector {
    #[must_use]
    pub const fn new(
        url: String,
        node_id: u32,
        token: Option<Arc<SecretString>>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            url,
            node_id,
            token,
            connect_timeout,
        }
    }
}

impl Connector for WsConnector {
    async fn connect(&self) -> Result<Session, ControlError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(ControlError::Request)?;
        let headers = request.headers_mut();
        headers.insert(NODE_ID_HEADER, HeaderValue::from(self.node_id));
        if let Some(token) = &self.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let (stream, response) = timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| ControlError::Timeout(self.connect_timeout))??;
        debug!(status = %response.status(), "Control channel upgraded");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(SESSION_QUEUE);
        let (in_tx, in_rx) = mpsc::channel(SESSION_QUEUE);

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        outgoing = out_rx.recv() => {
                            let Some(envelope) = outgoing else {
                                drop(sink.close().await);
                                break;
                            };
                            let text = match serde_json::to_string(&envelope) {
                                Ok(text) => text,
                                Err(e) => {
                                    warn!(event = %envelope.event, "Failed to encode event: {e}");
                                    continue;
                                }
                            };
                            if let Err(e) = sink.send(Message::text(text)).await {
                                warn!("Control channel send failed: {e}");
                                break;
                            }
                        }
                        incoming = source.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<Envelope>(text.as_str()) {
                                    Ok(envelope) => {
                                        if in_tx.send(envelope).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => warn!("Ignoring malformed control frame: {e}"),
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!(?frame, "Server closed control channel");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("Control channel receive failed: {e}");
                                break;
                            }
                            None => break,
                        },
                    }
                }
            }
            .in_current_span(),
        );

        Ok(Session {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
