//! Transport Session: one resilient websocket to the venue.
//!
//! Architecture:
//!   connect_forever ──frames──→ pending table (req_id) ──→ request() callers
//!                   └─────────→ SessionEvent::Message ──→ engine
//!
//! A session survives disconnects on its own: connection loss fails every
//! pending request, notifies the engine with `SessionEvent::Disconnected`
//! and reconnects with exponential backoff. Stopping is final; a reboot
//! builds fresh sessions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{sleep, sleep_until, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::config::SessionTimings;
use super::error::{DerivError, Result};
use super::messages::SessionEvent;
use super::protocol;
use super::types::SessionKind;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

type PendingTable = HashMap<u64, oneshot::Sender<Result<Value>>>;

/// Request/response capability of a trading session. The execution state
/// machine only needs this, so tests can drive it with a scripted venue.
pub trait VenueApi: Send + Sync + 'static {
    fn kind(&self) -> SessionKind;

    fn call(
        &self,
        payload: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// How one connection ended.
enum Exit {
    /// Transport failure; observers are told.
    Lost(DerivError),
    /// A caller dropped the connection to force a fresh one. Observers are
    /// told and the redial is immediate.
    Reset,
    Stopped,
}

pub struct DerivSession {
    kind: SessionKind,
    url: String,
    generation: u64,
    timings: SessionTimings,
    events: mpsc::UnboundedSender<SessionEvent>,
    req_seq: AtomicU64,
    conn_seq: AtomicU64,
    pending: StdMutex<PendingTable>,
    /// Held for the whole of a correlated request.
    request_lock: Mutex<()>,
    /// Write half of the live connection; the lock serializes writes.
    sink: Mutex<Option<WsSink>>,
    /// Id of the live connection, `None` while disconnected.
    link: watch::Sender<Option<u64>>,
    stop: watch::Sender<bool>,
}

impl DerivSession {
    pub fn new(
        kind: SessionKind,
        url: impl Into<String>,
        generation: u64,
        events: mpsc::UnboundedSender<SessionEvent>,
        timings: SessionTimings,
    ) -> Arc<Self> {
        let (link, _) = watch::channel(None);
        let (stop, _) = watch::channel(false);
        Arc::new(Self {
            kind,
            url: url.into(),
            generation,
            timings,
            events,
            req_seq: AtomicU64::new(0),
            conn_seq: AtomicU64::new(0),
            pending: StdMutex::new(HashMap::new()),
            request_lock: Mutex::new(()),
            sink: Mutex::new(None),
            link,
            stop,
        })
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self) -> bool {
        self.link.borrow().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    // ─────────────────────────────────────────────────────
    // Connection loop
    // ─────────────────────────────────────────────────────

    /// Runs until `stop()`. Keeps one connection alive at a time.
    pub async fn connect_forever(self: Arc<Self>) {
        let mut stop_rx = self.stop.subscribe();
        let mut delay = self.timings.backoff.floor;
        info!(session = %self.kind, url = %self.url, "🔌 session loop started");

        while !self.is_stopped() {
            let exit = tokio::select! {
                opened = self.open() => match opened {
                    Ok(ws) => {
                        delay = self.timings.backoff.floor;
                        self.serve(ws, &mut stop_rx).await
                    }
                    Err(e) => Exit::Lost(e),
                },
                _ = stopped(&mut stop_rx) => Exit::Stopped,
            };

            match exit {
                Exit::Stopped => break,
                Exit::Reset => {
                    // Authorization and subscriptions are per socket.
                    let cause = DerivError::connection_lost(self.kind, "connection reset");
                    self.teardown(cause.clone()).await;
                    let _ = self.events.send(SessionEvent::Disconnected {
                        session: self.kind,
                        generation: self.generation,
                        cause,
                    });
                    debug!(session = %self.kind, "connection reset, reconnecting");
                }
                Exit::Lost(cause) => {
                    self.teardown(cause.clone()).await;
                    let _ = self.events.send(SessionEvent::Disconnected {
                        session: self.kind,
                        generation: self.generation,
                        cause: cause.clone(),
                    });
                    if self.is_stopped() {
                        break;
                    }
                    warn!(
                        session = %self.kind,
                        retry_in_ms = delay.as_millis() as u64,
                        "⚠️ connection lost: {cause}"
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = stopped(&mut stop_rx) => break,
                    }
                    delay = self.timings.backoff.next(delay);
                }
            }
        }

        self.teardown(DerivError::connection_lost(self.kind, "session stopped"))
            .await;
        info!(session = %self.kind, "session loop finished");
    }

    async fn open(&self) -> Result<WsStream> {
        match timeout(self.timings.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((ws, response))) => {
                info!(session = %self.kind, status = ?response.status(), "✅ connected");
                Ok(ws)
            }
            Ok(Err(e)) => Err(DerivError::connection_lost(self.kind, e.to_string())),
            Err(_) => Err(DerivError::Timeout {
                session: self.kind,
                what: "connect",
            }),
        }
    }

    /// Read loop of one live connection.
    async fn serve(&self, ws: WsStream, stop_rx: &mut watch::Receiver<bool>) -> Exit {
        let (write, mut read) = ws.split();
        *self.sink.lock().await = Some(write);
        let conn = self.conn_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.link.send_replace(Some(conn));
        let mut link_rx = self.link.subscribe();

        if self.is_stopped() {
            return Exit::Stopped;
        }

        let mut last_rx = Instant::now();
        let mut pinged = false;
        loop {
            let idle = sleep_until(last_rx + self.timings.heartbeat);
            tokio::select! {
                frame = read.next() => {
                    match self.on_frame(frame) {
                        Ok(()) => {
                            last_rx = Instant::now();
                            pinged = false;
                        }
                        Err(e) => return Exit::Lost(e),
                    }
                }
                _ = idle => {
                    if pinged {
                        return Exit::Lost(DerivError::Timeout {
                            session: self.kind,
                            what: "heartbeat",
                        });
                    }
                    pinged = true;
                    last_rx = Instant::now();
                    let deadline = last_rx + self.timings.heartbeat;
                    if let Err(e) = self.write(conn, Message::Ping(Vec::new()), deadline).await {
                        return Exit::Lost(e);
                    }
                }
                changed = link_rx.changed() => {
                    let current = *link_rx.borrow_and_update();
                    if changed.is_err() || current != Some(conn) {
                        return if self.is_stopped() { Exit::Stopped } else { Exit::Reset };
                    }
                }
                _ = stopped(stop_rx) => return Exit::Stopped,
            }
        }
    }

    fn on_frame(&self, frame: Option<std::result::Result<Message, WsError>>) -> Result<()> {
        match frame {
            Some(Ok(Message::Text(text))) => self.dispatch(&text),
            Some(Ok(Message::Close(_))) => Err(DerivError::connection_lost(
                self.kind,
                "closed by server",
            )),
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(DerivError::connection_lost(self.kind, e.to_string())),
            None => Err(DerivError::connection_lost(self.kind, "stream ended")),
        }
    }

    /// Resolve the matching pending request, then forward to observers.
    fn dispatch(&self, text: &str) -> Result<()> {
        let msg: Value = serde_json::from_str(text).map_err(|e| {
            DerivError::ProtocolViolation(format!("[{}] undecodable frame: {e}", self.kind))
        })?;

        if let Some(id) = protocol::req_id(&msg) {
            let slot = self.pending().remove(&id);
            match slot {
                Some(tx) => {
                    let _ = tx.send(Ok(msg.clone()));
                }
                None => debug!(session = %self.kind, req_id = id, "response for unknown request"),
            }
        }

        let _ = self.events.send(SessionEvent::Message {
            session: self.kind,
            generation: self.generation,
            msg,
        });
        Ok(())
    }

    /// Clear connection state after a connection ended.
    async fn teardown(&self, cause: DerivError) {
        self.link.send_replace(None);
        self.fail_pending(&cause);
        self.sink.lock().await.take();
    }

    fn fail_pending(&self, cause: &DerivError) {
        let drained: Vec<_> = self.pending().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(cause.clone()));
        }
    }

    fn pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────

    /// Write a frame on connection `conn`. Fails if that connection is no
    /// longer the live one.
    async fn write(&self, conn: u64, msg: Message, deadline: Instant) -> Result<()> {
        let mut sink = match timeout_at(deadline, self.sink.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Err(self.timeout("send")),
        };
        let live = *self.link.borrow();
        if live != Some(conn) {
            return Err(DerivError::connection_lost(self.kind, "connection replaced"));
        }
        let ws = sink
            .as_mut()
            .ok_or_else(|| DerivError::connection_lost(self.kind, "not connected"))?;
        match timeout_at(deadline, ws.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DerivError::connection_lost(self.kind, e.to_string())),
            Err(_) => Err(self.timeout("send")),
        }
    }

    /// Wait until a connection is live and return its id.
    async fn wait_connected(&self, deadline: Instant) -> Result<u64> {
        let mut link_rx = self.link.subscribe();
        let mut stop_rx = self.stop.subscribe();
        loop {
            if self.is_stopped() {
                return Err(DerivError::connection_lost(self.kind, "session stopped"));
            }
            let current = *link_rx.borrow_and_update();
            if let Some(conn) = current {
                return Ok(conn);
            }
            let changed = timeout_at(deadline, async {
                tokio::select! {
                    r = link_rx.changed() => r,
                    r = stop_rx.changed() => r,
                }
            })
            .await;
            match changed {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    return Err(DerivError::connection_lost(self.kind, "session dropped"))
                }
                Err(_) => return Err(self.timeout("connection")),
            }
        }
    }

    /// Drop connection `conn` so the loop dials a fresh one.
    fn reset(&self, conn: u64) {
        self.link.send_if_modified(|live| {
            if *live == Some(conn) {
                *live = None;
                true
            } else {
                false
            }
        });
    }

    /// Sleep the retry pause, failing if it would cross the deadline.
    async fn pause(&self, deadline: Instant, what: &'static str) -> Result<()> {
        let wake = Instant::now() + self.timings.retry_pause;
        if wake >= deadline {
            sleep_until(deadline).await;
            return Err(self.timeout(what));
        }
        sleep_until(wake).await;
        Ok(())
    }

    fn timeout(&self, what: &'static str) -> DerivError {
        DerivError::Timeout {
            session: self.kind,
            what,
        }
    }

    /// Fire-and-forget write. One retry on a fresh connection if the first
    /// send fails.
    pub async fn send_only(&self, payload: &Value, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let text = payload.to_string();

        let conn = self.wait_connected(deadline).await?;
        match self.write(conn, Message::Text(text.clone()), deadline).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() || self.is_stopped() => Err(e),
            Err(e) => {
                debug!(session = %self.kind, "send failed, retrying once: {e}");
                self.reset(conn);
                let conn = self.wait_connected(deadline).await?;
                self.write(conn, Message::Text(text), deadline).await
            }
        }
    }

    /// Correlated request. Each attempt gets a fresh `req_id`; attempts are
    /// retried on send failure or connection loss until `timeout` elapses.
    pub async fn request(&self, payload: Value, timeout: Duration) -> Result<Value> {
        let deadline = Instant::now() + timeout;
        let _slot = timeout_at(deadline, self.request_lock.lock())
            .await
            .map_err(|_| self.timeout("request slot"))?;

        loop {
            let conn = self.wait_connected(deadline).await?;
            let id = self.req_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let frame = protocol::with_req_id(payload.clone(), id)?;

            let (tx, rx) = oneshot::channel();
            self.pending().insert(id, tx);

            if let Err(e) = self.write(conn, Message::Text(frame.to_string()), deadline).await {
                self.pending().remove(&id);
                if self.is_stopped() {
                    return Err(e);
                }
                debug!(session = %self.kind, req_id = id, "send failed: {e}");
                self.reset(conn);
                self.pause(deadline, "response").await?;
                continue;
            }

            match timeout_at(deadline, rx).await {
                Ok(Ok(Ok(msg))) => return Ok(msg),
                Ok(Ok(Err(e))) => {
                    // Slot already consumed by the connection teardown.
                    if self.is_stopped() {
                        return Err(e);
                    }
                    debug!(session = %self.kind, req_id = id, "request interrupted: {e}");
                    self.pause(deadline, "response").await?;
                }
                Ok(Err(_)) => {
                    self.pending().remove(&id);
                    self.pause(deadline, "response").await?;
                }
                Err(_) => {
                    self.pending().remove(&id);
                    self.reset(conn);
                    return Err(self.timeout("response"));
                }
            }
        }
    }

    /// Idempotent. Fails every pending request and ends `connect_forever`.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        self.link.send_replace(None);
        self.fail_pending(&DerivError::connection_lost(self.kind, "session stopped"));
    }

    /// `stop()` plus a bounded close handshake on the live connection.
    pub async fn close(&self) {
        self.stop();
        let sink = self.sink.lock().await.take();
        if let Some(mut ws) = sink {
            let _ = timeout(Duration::from_secs(1), ws.close()).await;
        }
    }
}

/// Resolves once the stop flag is set.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop || rx.changed().await.is_err() {
            return;
        }
    }
}

impl VenueApi for DerivSession {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    fn call(
        &self,
        payload: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value>> + Send {
        self.request(payload, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deriv::config::BackoffPolicy;
    use crate::deriv::mock_venue::{reply, MockVenue};
    use secrecy::SecretString;
    use serde_json::json;

    fn session(url: &str) -> (Arc<DerivSession>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let s = DerivSession::new(SessionKind::Demo, url, 1, tx, SessionTimings::default());
        (s, rx)
    }

    fn ping_responder(req: &Value) -> Vec<Value> {
        if req.get("ping").is_some() {
            vec![reply(req, "ping", json!({"ping": "pong"}))]
        } else {
            Vec::new()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_when_never_connected() {
        let (s, _rx) = session("ws://127.0.0.1:9");
        let started = Instant::now();
        let err = s
            .request(json!({"ping": 1}), Duration::from_secs(5))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();
        assert!(err.is_timeout(), "{err:?}");
        assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(5200), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_session_fails_fast() {
        let (s, _rx) = session("ws://127.0.0.1:9");
        s.stop();
        s.stop();
        let started = Instant::now();
        let err = s
            .request(json!({"ping": 1}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DerivError::ConnectionLost { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(s.send_only(&json!({"ping": 1}), Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test]
    async fn test_request_round_trip_and_fresh_ids() {
        let venue = MockVenue::spawn(ping_responder).await;
        let (s, mut rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());

        let first = s.request(json!({"ping": 1}), Duration::from_secs(5)).await.unwrap();
        let second = s.request(json!({"ping": 1}), Duration::from_secs(5)).await.unwrap();
        assert_eq!(first["ping"], "pong");
        let (a, b) = (protocol::req_id(&first).unwrap(), protocol::req_id(&second).unwrap());
        assert!(b > a);

        // Responses are also forwarded to observers.
        match rx.recv().await.unwrap() {
            SessionEvent::Message { session, generation, msg } => {
                assert_eq!(session, SessionKind::Demo);
                assert_eq!(generation, 1);
                assert_eq!(protocol::req_id(&msg), Some(a));
            }
            other => panic!("unexpected {other:?}"),
        }

        s.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_response_id_is_ignored() {
        let venue = MockVenue::spawn(|req: &Value| {
            if req.get("ping").is_some() {
                vec![
                    json!({"msg_type": "ping", "req_id": 999_999, "ping": "stray"}),
                    reply(req, "ping", json!({"ping": "pong"})),
                ]
            } else {
                Vec::new()
            }
        })
        .await;
        let (s, _rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());

        let resp = s.request(json!({"ping": 1}), Duration::from_secs(5)).await.unwrap();
        assert_eq!(resp["ping"], "pong");
        assert!(s.is_connected());

        s.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drop() {
        let venue = MockVenue::spawn(ping_responder).await;
        let (s, mut rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());

        s.request(json!({"ping": 1}), Duration::from_secs(5)).await.unwrap();
        venue.drop_clients();

        let disconnected = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(SessionEvent::Disconnected { session, .. }) = rx.recv().await {
                    return session;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(disconnected, SessionKind::Demo);

        // Backoff floor is 1s; the request waits for the new connection.
        let resp = s.request(json!({"ping": 1}), Duration::from_secs(10)).await.unwrap();
        assert_eq!(resp["ping"], "pong");
        assert_eq!(venue.connections(), 2);

        s.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_only_reaches_venue() {
        let venue = MockVenue::spawn(|_: &Value| Vec::new()).await;
        let (s, _rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());

        s.send_only(&protocol::subscribe_ticks("R_10"), Duration::from_secs(5))
            .await
            .unwrap();
        let seen = venue
            .wait_received(|msgs| msgs.iter().any(|m| m["ticks"] == "R_10"))
            .await;
        assert!(seen);

        s.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_fails_in_flight_request() {
        // Venue never answers, so the request stays pending until stop.
        let venue = MockVenue::spawn(|_: &Value| Vec::new()).await;
        let (s, _rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());

        let caller = {
            let s = s.clone();
            tokio::spawn(async move { s.request(json!({"ping": 1}), Duration::from_secs(30)).await })
        };
        venue.wait_received(|msgs| !msgs.is_empty()).await;
        s.stop();

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, DerivError::ConnectionLost { .. }), "{err:?}");
        task.await.unwrap();
        assert!(!s.is_connected());
    }

    async fn next_disconnect(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> DerivError {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(SessionEvent::Disconnected { cause, .. }) = rx.recv().await {
                    return cause;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_response_timeout_reset_notifies_observers() {
        // Authorizes, then never answers the contract poll.
        let venue = MockVenue::spawn(|req: &Value| {
            if req.get("authorize").is_some() {
                vec![reply(req, "authorize", json!({"authorize": {"loginid": "VRTC1"}}))]
            } else {
                Vec::new()
            }
        })
        .await;
        let (s, mut rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());

        let token = SecretString::from("demo-token".to_string());
        s.request(protocol::authorize(&token), Duration::from_secs(5))
            .await
            .unwrap();
        let err = s
            .request(
                json!({"proposal_open_contract": 1, "contract_id": 4242}),
                Duration::from_millis(500),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err:?}");

        // The redial drops the authorization, so the engine must hear about it.
        let cause = next_disconnect(&mut rx).await;
        assert!(matches!(cause, DerivError::ConnectionLost { .. }), "{cause:?}");
        assert!(venue.wait_connections(2).await);

        s.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_backoff_returns_to_floor_after_reconnect() {
        let venue = MockVenue::spawn(ping_responder).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timings = SessionTimings {
            backoff: BackoffPolicy {
                floor: Duration::from_millis(200),
                ceiling: Duration::from_secs(10),
                factor: 10.0,
            },
            ..SessionTimings::default()
        };
        let s = DerivSession::new(SessionKind::Demo, venue.url(), 1, tx, timings);
        let task = tokio::spawn(s.clone().connect_forever());

        s.request(json!({"ping": 1}), Duration::from_secs(5)).await.unwrap();
        venue.drop_clients();
        next_disconnect(&mut rx).await;
        s.request(json!({"ping": 1}), Duration::from_secs(5)).await.unwrap();
        assert_eq!(venue.connections(), 2);

        // Second loss waits the floor again, not floor * factor.
        let dropped = Instant::now();
        venue.drop_clients();
        next_disconnect(&mut rx).await;
        assert!(venue.wait_connections(3).await);
        let elapsed = dropped.elapsed();
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");

        s.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_only_retries_once_on_new_connection() {
        let venue = MockVenue::spawn(|_: &Value| Vec::new()).await;
        let (s, _rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());
        assert!(venue.wait_connections(1).await);
        let conn = s.wait_connected(Instant::now() + Duration::from_secs(5)).await.unwrap();

        // Hold the writer so the first send is queued behind a replacement.
        let guard = s.sink.lock().await;
        let sender = {
            let s = s.clone();
            tokio::spawn(async move {
                s.send_only(&protocol::subscribe_ticks("R_10"), Duration::from_secs(10))
                    .await
            })
        };
        sleep(Duration::from_millis(50)).await;
        s.reset(conn);
        sleep(Duration::from_millis(50)).await;
        drop(guard);

        sender.await.unwrap().unwrap();
        let seen = venue
            .wait_received(|msgs| msgs.iter().any(|m| m["ticks"] == "R_10"))
            .await;
        assert!(seen);
        assert_eq!(venue.connections(), 2);
        assert_ne!(*s.link.borrow(), Some(conn));

        s.close().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_interrupted_request_is_resent_with_fresh_id() {
        // The first attempt is swallowed; later ids are answered.
        let venue = MockVenue::spawn(|req: &Value| match protocol::req_id(req) {
            Some(id) if id >= 2 => vec![reply(req, "ping", json!({"ping": "pong"}))],
            _ => Vec::new(),
        })
        .await;
        let (s, _rx) = session(&venue.url());
        let task = tokio::spawn(s.clone().connect_forever());

        let caller = {
            let s = s.clone();
            tokio::spawn(async move { s.request(json!({"ping": 1}), Duration::from_secs(10)).await })
        };
        assert!(venue.wait_received(|msgs| !msgs.is_empty()).await);
        venue.drop_clients();

        let resp = caller.await.unwrap().unwrap();
        assert_eq!(protocol::req_id(&resp), Some(2));
        let ids: Vec<u64> = venue.received().iter().filter_map(protocol::req_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(venue.connections(), 2);

        s.close().await;
        task.await.unwrap();
    }
}
