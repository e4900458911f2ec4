//! In-process websocket venue for tests.
//!
//! Every inbound JSON frame is recorded and handed to a responder closure;
//! whatever it returns is written back on the same connection. Tests can
//! also push unsolicited frames and sever every client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

enum Outbound {
    Frame(Message),
    Sever,
}

struct VenueState {
    responder: Responder,
    received: StdMutex<Vec<Value>>,
    clients: StdMutex<Vec<mpsc::UnboundedSender<Outbound>>>,
    connections: AtomicUsize,
}

pub struct MockVenue {
    addr: SocketAddr,
    state: Arc<VenueState>,
    handle: JoinHandle<()>,
}

/// Response frame echoing the request's `req_id`.
pub fn reply(request: &Value, msg_type: &str, body: Value) -> Value {
    let mut out = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    out.insert("msg_type".to_string(), Value::from(msg_type));
    if let Some(id) = request.get("req_id") {
        out.insert("req_id".to_string(), id.clone());
    }
    if let Some(echo) = request.as_object() {
        let mut echo = echo.clone();
        echo.remove("req_id");
        out.insert("echo_req".to_string(), Value::Object(echo));
    }
    Value::Object(out)
}

impl MockVenue {
    pub async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind mock venue");
        let addr = listener.local_addr().expect("mock venue addr");
        let state = Arc::new(VenueState {
            responder: Arc::new(responder),
            received: StdMutex::new(Vec::new()),
            clients: StdMutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
        });

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let state = accept_state.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_socket(state, stream).await {
                                warn!(error = %err, "mock venue connection ended with error");
                            }
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "mock venue accept failed");
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send an unsolicited frame to every connected client.
    pub fn push(&self, msg: Value) {
        let clients = self.state.clients.lock().expect("clients lock");
        for tx in clients.iter() {
            let _ = tx.send(Outbound::Frame(Message::Text(msg.to_string())));
        }
    }

    /// Close every connection without a close handshake.
    pub fn drop_clients(&self) {
        let mut clients = self.state.clients.lock().expect("clients lock");
        for tx in clients.drain(..) {
            let _ = tx.send(Outbound::Sever);
        }
    }

    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().expect("received lock").clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Poll the received log until `pred` holds (5s cap).
    pub async fn wait_received(&self, pred: impl Fn(&[Value]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if pred(&self.received()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pred(&self.received())
    }

    /// Poll until at least `n` connections were accepted (5s cap).
    pub async fn wait_connections(&self, n: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if self.connections() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for MockVenue {
    fn drop(&mut self) {
        self.handle.abort();
        self.drop_clients();
    }
}

async fn handle_socket(state: Arc<VenueState>, stream: TcpStream) -> anyhow::Result<()> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.clients.lock().expect("clients lock").push(tx);
    state.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Some(Outbound::Frame(msg)) => sink.send(msg).await?,
                Some(Outbound::Sever) | None => break,
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    state.received.lock().expect("received lock").push(value.clone());
                    for resp in (state.responder)(&value) {
                        sink.send(Message::Text(resp.to_string())).await?;
                    }
                }
                Some(Ok(Message::Ping(payload))) => sink.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    Ok(())
}
