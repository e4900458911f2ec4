//! Session Pool: the three transport sessions of one engine generation.
//!
//! Sessions are never reused across a reboot: the engine shuts the whole
//! pool down and opens a new one with the next generation number.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::config::SessionTimings;
use super::messages::SessionEvent;
use super::session::DerivSession;
use super::types::SessionKind;

pub struct SessionPool {
    generation: u64,
    feed: Arc<DerivSession>,
    demo: Arc<DerivSession>,
    real: Arc<DerivSession>,
    handles: Vec<JoinHandle<()>>,
}

impl SessionPool {
    /// Create the feed/demo/real sessions and start their connect loops.
    pub fn open(
        url: &str,
        generation: u64,
        events: mpsc::UnboundedSender<SessionEvent>,
        timings: SessionTimings,
    ) -> Self {
        let make = |kind| DerivSession::new(kind, url, generation, events.clone(), timings);
        let feed = make(SessionKind::Feed);
        let demo = make(SessionKind::Demo);
        let real = make(SessionKind::Real);

        let handles = [&feed, &demo, &real]
            .into_iter()
            .map(|s| tokio::spawn(s.clone().connect_forever()))
            .collect();

        info!(generation, "🧩 session pool opened");
        Self {
            generation,
            feed,
            demo,
            real,
            handles,
        }
    }

    pub fn session(&self, kind: SessionKind) -> Arc<DerivSession> {
        match kind {
            SessionKind::Feed => self.feed.clone(),
            SessionKind::Demo => self.demo.clone(),
            SessionKind::Real => self.real.clone(),
        }
    }

    /// Stop every session without waiting. Pending requests fail at once.
    pub fn stop_all(&self) {
        for s in [&self.feed, &self.demo, &self.real] {
            s.stop();
        }
    }

    /// Close all sessions and wait for their loops to finish.
    pub async fn shutdown(self) {
        self.stop_all();
        for s in [&self.feed, &self.demo, &self.real] {
            s.close().await;
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        info!(generation = self.generation, "session pool closed");
    }
}
