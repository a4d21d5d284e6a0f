//! Session WebSocket
//!
//! The socket is split on open: the session keeps the sink and a reader task
//! owns the stream. The reader filters protocol noise and feeds everything
//! else into the session's bounded [`receive_queue`](crate::queue).

use crate::codec;
use crate::queue::{receive_queue, FailureSlot, QueueConsumer, QueueProducer};
use crate::result::{VolleyError, VolleyResult};
use crate::target::USER_AGENT;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection parameters for [`SessionSocket::connect`]
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Handshake timeout
    pub connect_timeout: Duration,
    /// Receive queue capacity
    pub queue_capacity: usize,
    /// Interval between "still waiting" warnings
    pub warn_interval: Duration,
}

/// An open session WebSocket
#[derive(Debug)]
pub struct SessionSocket {
    sink: SplitSink<WsStream, Message>,
    inbound: QueueConsumer,
    closing: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl SessionSocket {
    /// Open a socket and start its reader task
    ///
    /// The handshake carries the session's custom headers, the user agent and
    /// `cookie` when present.
    pub async fn connect(
        url: &str,
        headers: &HeaderMap,
        cookie: Option<&str>,
        options: &SocketOptions,
    ) -> VolleyResult<Self> {
        let mut request = url.into_client_request()?;
        {
            let request_headers = request.headers_mut();
            for (name, value) in headers {
                let name = HeaderName::from_bytes(name.as_str().as_bytes())
                    .map_err(|e| VolleyError::websocket(e.to_string()))?;
                let value = HeaderValue::from_bytes(value.as_bytes())
                    .map_err(|e| VolleyError::websocket(e.to_string()))?;
                request_headers.append(name, value);
            }
            request_headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
            if let Some(cookie) = cookie {
                let value = HeaderValue::from_str(cookie)
                    .map_err(|e| VolleyError::websocket(e.to_string()))?;
                request_headers.insert("cookie", value);
            }
        }

        let (stream, _response) =
            tokio::time::timeout(options.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| VolleyError::ConnectTimeout {
                    url: url.to_string(),
                    ms: options.connect_timeout.as_millis() as u64,
                })??;

        let (sink, stream) = stream.split();
        let (producer, inbound) = receive_queue(options.queue_capacity, options.warn_interval);
        let closing = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_frames(stream, producer, Arc::clone(&closing)));

        Ok(Self {
            sink,
            inbound,
            closing,
            reader,
        })
    }

    /// Send a text frame
    pub async fn send(&mut self, text: String) -> VolleyResult<()> {
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Next non-ignorable frame
    pub async fn receive(&mut self, event: &str, line_number: usize) -> VolleyResult<String> {
        self.inbound.take(event, line_number).await
    }

    /// Failure reported by the reader, if any
    #[must_use]
    pub const fn failure(&self) -> &FailureSlot {
        self.inbound.failure()
    }

    /// Send a close frame without waiting for the server's reply
    pub async fn close(mut self) -> VolleyResult<()> {
        self.closing.store(true, Ordering::SeqCst);
        let result = self.sink.send(Message::Close(None)).await;
        self.reader.abort();
        result.map_err(VolleyError::from)
    }
}

impl Drop for SessionSocket {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.reader.abort();
    }
}

/// Reader task: filter, enqueue, and report transport failures
async fn read_frames(
    mut stream: SplitStream<WsStream>,
    producer: QueueProducer,
    closing: Arc<AtomicBool>,
) {
    let fail = |err: VolleyError| {
        if !closing.load(Ordering::SeqCst) {
            producer.fail(err);
        }
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let text = text.as_str();
                match codec::can_ignore(text) {
                    Ok(true) => debug!("%%% Ignoring {text}"),
                    Ok(false) => {
                        debug!("%%% Received: {text}");
                        if let Err(e) = producer.offer(text.to_string()) {
                            fail(e);
                            return;
                        }
                    }
                    Err(e) => {
                        fail(e);
                        return;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                fail(VolleyError::websocket("Server closed websocket connection"));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                fail(e.into());
                return;
            }
        }
    }
    fail(VolleyError::websocket("websocket stream ended"));
}
