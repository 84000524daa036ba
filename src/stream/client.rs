// Quote stream client: one websocket connection, one background task.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::StreamConfig;
use crate::stream::codec::{parse_frame, parse_handshake};
use crate::stream::error::{StreamError, StreamResult};
use crate::stream::types::{Action, ControlMessage, Frame};
use crate::subscription::state::{StreamState, Subscription};

/// A control frame waiting to be written, plus who to tell once it is.
struct Outbound {
    message: ControlMessage,
    ack: oneshot::Sender<StreamResult<()>>,
}

pub struct QuoteStreamClient {
    config: StreamConfig,
    subscription: Arc<Subscription>,
    control_tx: mpsc::UnboundedSender<Outbound>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QuoteStreamClient {
    pub fn new(config: StreamConfig, subscription: Arc<Subscription>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            config,
            subscription,
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Spawn the connection task and return straight away. Readiness is
    /// observed through the shared `Subscription`. Later calls are no-ops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if !self.subscription.begin_connect() {
            trace!(state = ?self.subscription.state(), "Stream already started");
            return;
        }

        let Some(control_rx) = self.control_rx.lock().take() else {
            self.subscription.mark_closed();
            return;
        };

        let session = Session {
            config: self.config.clone(),
            subscription: Arc::clone(&self.subscription),
            control_rx,
            shutdown: self.shutdown.clone(),
        };
        info!(url = %self.config.ws_url, "Starting quote stream");
        *self.task.lock() = Some(tokio::spawn(session.run()));
    }

    /// Queue an identifier-scoped control frame and wait until it is written.
    pub async fn send_control(
        &self,
        action: Action,
        symbols: Vec<String>,
        threshold_level: Option<u32>,
    ) -> StreamResult<()> {
        let id = self
            .subscription
            .subscription_id()
            .ok_or(StreamError::NotReady)?
            .clone();
        if self.subscription.state() == StreamState::Closed {
            return Err(StreamError::Closed);
        }

        let message = ControlMessage::new(action, &self.config.api_token, Some(id), threshold_level, symbols);
        let (ack, done) = oneshot::channel();
        self.control_tx
            .send(Outbound { message, ack })
            .map_err(|_| StreamError::Closed)?;
        done.await.map_err(|_| StreamError::Closed)?
    }

    /// Stop the connection task. Waiters on readiness are released with `Closed`.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(handle) = task {
            if let Err(e) = handle.await {
                error!(error = %e, "Stream task panicked");
            }
        }
        self.subscription.mark_closed();
    }
}

impl Drop for QuoteStreamClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Everything the connection task owns.
struct Session {
    config: StreamConfig,
    subscription: Arc<Subscription>,
    control_rx: mpsc::UnboundedReceiver<Outbound>,
    shutdown: CancellationToken,
}

impl Session {
    async fn run(mut self) {
        if let Err(e) = self.connect_and_receive().await {
            error!(error = %e, "Quote stream terminated");
        }
        self.subscription.mark_closed();

        // Anything still queued never made it onto the wire.
        self.control_rx.close();
        while let Some(pending) = self.control_rx.recv().await {
            let _ = pending.ack.send(Err(StreamError::Closed));
        }
    }

    async fn connect_and_receive(&mut self) -> StreamResult<()> {
        let connect = tokio_tungstenite::connect_async(self.config.ws_url.as_str());
        let (ws_stream, response) = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            result = connect => result?,
        };
        debug!(status = %response.status(), "Websocket connected");

        let (mut write, mut read) = ws_stream.split();

        let handshake = ControlMessage::handshake(
            &self.config.api_token,
            self.config.threshold_level,
            self.config.default_tickers.clone(),
        );
        write.send(Message::Text(handshake.to_json()?)).await?;
        debug!(tickers = ?self.config.default_tickers, "Handshake sent");

        self.receive_loop(&mut write, &mut read).await
    }

    #[instrument(skip_all, fields(url = %self.config.ws_url))]
    async fn receive_loop<W, R>(&mut self, write: &mut W, read: &mut R) -> StreamResult<()>
    where
        W: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
        R: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, closing stream");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(outbound) = self.control_rx.recv() => {
                    let result = match outbound.message.to_json() {
                        Ok(text) => write.send(Message::Text(text)).await.map_err(StreamError::from),
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(()) => {
                            debug!(action = ?outbound.message.event_name, tickers = ?outbound.message.event_data.tickers, "Control message sent");
                            let _ = outbound.ack.send(Ok(()));
                        }
                        Err(StreamError::Connection(e)) => {
                            let _ = outbound.ack.send(Err(StreamError::Closed));
                            return Err(StreamError::Connection(e));
                        }
                        Err(e) => {
                            let _ = outbound.ack.send(Err(e));
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "Websocket connection closed by server");
                            return Ok(());
                        }
                        Some(Ok(other)) => {
                            trace!(?other, "Ignoring non-text message");
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            info!("Websocket stream ended");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        metrics::counter!("qstream_frames_total").increment(1);

        if self.subscription.subscription_id().is_none() {
            match parse_handshake(text) {
                Ok(id) => {
                    for ticker in &self.config.default_tickers {
                        self.subscription.track(&ticker.to_lowercase());
                    }
                    if self.subscription.mark_ready(id) {
                        info!("Websocket subscription established");
                    }
                }
                Err(e) => {
                    metrics::counter!("qstream_decode_errors_total").increment(1);
                    warn!(error = %e, raw = %text, "Can't parse subscription id");
                }
            }
            return;
        }

        match parse_frame(text) {
            Ok(Frame::Update(update)) => {
                self.subscription.apply_update(&update);
            }
            Ok(Frame::Heartbeat) => trace!("Heartbeat"),
            Ok(Frame::Info) => debug!(raw = %text, "Info message"),
            Ok(Frame::ProviderError(message)) => warn!(%message, "Provider reported an error"),
            Ok(Frame::Other(kind)) => debug!(message_type = %kind, "Ignoring message"),
            Err(e) => {
                metrics::counter!("qstream_decode_errors_total").increment(1);
                warn!(error = %e, raw = %text, "Can't parse response");
            }
        }
    }
}
