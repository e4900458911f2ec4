//! Engine Orchestrator: the single writer of trading state.
//!
//! Architecture:
//!   EngineHandle ──EngineCommand──→ Engine ←──SessionEvent── SessionPool
//!                                     │  ↑
//!                     spawn startup / │  │ Internal (startup done,
//!                     spawn run       ↓  │  run finished, retry reboot)
//!                                   tasks
//!
//! The actor owns the ledger, arming state and busy flag and is the only
//! code that mutates them. Everything slow (authorize, subscribe, trade)
//! runs in spawned tasks that report back through `Internal`.
//!
//! Lifecycle:
//!   start → boot(generation N) → startup task → ready
//!   disconnect (gen N, gate open) → reboot → boot(N+1) → ...
//!   stop / stop-win → halt runs → drain in-flight run → close pool

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info};

use super::config::{is_blank, Credentials, EngineSettings, EngineTimings, TradingConfig};
use super::decoder::{decode, format_quote};
use super::error::{DerivError, Result};
use super::executor::{ExecutionRun, RunReport};
use super::ledger::{AccountLedger, ArmingTargets, VirtualArming};
use super::messages::{utc_ts, Reporter, SessionEvent, UiEvent};
use super::pool::SessionPool;
use super::protocol;
use super::session::DerivSession;
use super::types::{Account, Parity, RunStatus, SessionKind, SignalPlan};

// ─────────────────────────────────────────────────────────
// Commands & internal events
// ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum EngineCommand {
    Start {
        credentials: Credentials,
        config: TradingConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    ResetCountersAndViews {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartupOutcome {
    pub demo_authorized: bool,
    pub real_authorized: bool,
    pub confirmed: usize,
    pub total: usize,
}

#[derive(Debug)]
enum Internal {
    StartupFinished {
        generation: u64,
        result: Result<StartupOutcome>,
    },
    RunFinished(RunReport),
    RetryReboot {
        generation: u64,
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────

/// Inbound interface of the engine. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Validate `config` and start trading. Configuration errors are
    /// returned here and the engine stays idle.
    pub async fn start(&self, credentials: Credentials, config: TradingConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Start {
            credentials,
            config,
            reply,
        })
        .await?;
        rx.await.map_err(|_| DerivError::EngineUnavailable)?
    }

    /// Resolves once sessions are closed. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Stop { reply }).await?;
        rx.await.map_err(|_| DerivError::EngineUnavailable)
    }

    pub async fn reset_counters_and_views(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::ResetCountersAndViews { reply })
            .await?;
        rx.await.map_err(|_| DerivError::EngineUnavailable)
    }

    async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| DerivError::EngineUnavailable)
    }
}

// ─────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────

/// Serializes reboots and enforces the cooldown between them.
#[derive(Debug, Clone)]
pub struct RebootGate {
    in_progress: bool,
    last: Option<Instant>,
    cooldown: Duration,
}

impl RebootGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            in_progress: false,
            last: None,
            cooldown,
        }
    }

    /// Claim the gate for a reboot triggered at `now`.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if self.in_progress {
            return false;
        }
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.in_progress = true;
        self.last = Some(now);
        true
    }

    /// Claim for an explicit start. Does not count toward the cooldown.
    pub fn begin(&mut self) {
        self.in_progress = true;
    }

    pub fn finish(&mut self) {
        self.in_progress = false;
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }
}

/// Everything the engine mutates while trading.
#[derive(Debug, Default)]
pub struct EngineState {
    pub cfg: TradingConfig,
    pub ledger: AccountLedger,
    pub arming: VirtualArming,
    /// Between start and stop (including reboots).
    pub running: bool,
    /// Startup of the current generation has completed.
    pub ready: bool,
    /// An execution run is in flight.
    pub busy: bool,
}

impl EngineState {
    /// Turn a signal into a plan if no run is in flight. Sets `busy`.
    pub fn admit(&mut self, symbol: &str, direction: Parity) -> Option<SignalPlan> {
        if !self.running || !self.ready || self.busy {
            return None;
        }
        self.busy = true;
        Some(SignalPlan {
            symbol: symbol.to_string(),
            direction,
            account: self.arming.route(self.cfg.virtual_mode),
            base_stake: self.cfg.stake,
            max_gale: self.cfg.max_gale,
            mult: self.cfg.mult,
        })
    }

    /// Apply a finished run to the ledger and arming state. Clears `busy`.
    /// Arming only moves while running, so a run drained by a stop cannot
    /// arm the next start.
    pub fn book(&mut self, account: Account, status: RunStatus, profit: Decimal) -> Booking {
        self.busy = false;
        let mut booking = Booking::default();

        if account == Account::Real {
            self.ledger.record_run(status, profit);
            booking.ledger = true;
        }

        if self.cfg.virtual_mode && self.running {
            booking.arming = true;
            match account {
                Account::Demo => {
                    let targets = self.targets();
                    booking.newly_armed = self.arming.record_demo(status, targets);
                }
                Account::Real => self.arming.complete_real(),
            }
        }

        booking.stop_win = account == Account::Real
            && self.running
            && self.ledger.stop_win_reached(self.cfg.stop_win);
        booking
    }

    fn targets(&self) -> ArmingTargets {
        ArmingTargets {
            vwin: self.cfg.vwin_target,
            vloss: self.cfg.vloss_target,
        }
    }
}

/// What booking one finished run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Booking {
    /// Real-account counters moved.
    pub ledger: bool,
    /// Arming state was updated.
    pub arming: bool,
    pub newly_armed: bool,
    pub stop_win: bool,
}

// ─────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────

pub struct Engine {
    settings: EngineSettings,
    reporter: Reporter,
    state: EngineState,
    gate: RebootGate,
    generation: u64,
    pool: Option<SessionPool>,
    credentials: Option<Arc<Credentials>>,
    startup_task: Option<JoinHandle<()>>,
    /// `true` once a stop was requested; runs check it before each proposal.
    halt_tx: watch::Sender<bool>,
    /// Symbols that delivered at least one tick in this generation.
    tick_seen: watch::Sender<HashSet<String>>,

    cmd_rx: mpsc::Receiver<EngineCommand>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl Engine {
    /// Validate settings, spawn the actor and return its handle.
    pub fn spawn(
        settings: EngineSettings,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Result<(EngineHandle, JoinHandle<()>)> {
        settings.validate()?;
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (halt_tx, _) = watch::channel(true);
        let (tick_seen, _) = watch::channel(HashSet::new());

        let engine = Self {
            gate: RebootGate::new(settings.timings.reboot_cooldown),
            settings,
            reporter: Reporter::new(ui_tx),
            state: EngineState::default(),
            generation: 0,
            pool: None,
            credentials: None,
            startup_task: None,
            halt_tx,
            tick_seen,
            cmd_rx,
            session_tx,
            session_rx,
            internal_tx,
            internal_rx,
        };
        let task = tokio::spawn(engine.run());
        Ok((EngineHandle { cmd_tx }, task))
    }

    /// Actor main loop. Runs until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            symbols = self.settings.symbols.len(),
            url = %self.settings.ws_url,
            "🎯 engine started"
        );

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },
                Some(ev) = self.session_rx.recv() => self.on_session_event(ev).await,
                Some(ev) = self.internal_rx.recv() => self.on_internal(ev).await,
            }
        }

        self.stop_engine().await;
        info!("🎯 engine shutting down (all handles dropped)");
    }

    fn timings(&self) -> EngineTimings {
        self.settings.timings
    }

    // ═════════════════════════════════════════════════
    // Commands
    // ═════════════════════════════════════════════════

    async fn on_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Start {
                credentials,
                config,
                reply,
            } => {
                let result = self.start(credentials, config);
                let _ = reply.send(result);
            }
            EngineCommand::Stop { reply } => {
                self.stop_engine().await;
                let _ = reply.send(());
            }
            EngineCommand::ResetCountersAndViews { reply } => {
                self.reset_counters_and_views();
                let _ = reply.send(());
            }
        }
    }

    fn start(&mut self, credentials: Credentials, config: TradingConfig) -> Result<()> {
        let cfg = config.validated()?;
        if self.state.running {
            self.reporter.log("ENGINE", "Already running.");
            return Ok(());
        }

        self.reporter.log(
            "ENGINE",
            format!(
                "Starting | virtual={} vwin={} vloss={} trigger={} stake={:.2} max_gale={} mult={} stop_win={:.2}",
                cfg.virtual_mode,
                cfg.vwin_target,
                cfg.vloss_target,
                cfg.trigger_mode.as_str(),
                cfg.stake,
                cfg.max_gale,
                cfg.mult,
                cfg.stop_win
            ),
        );
        if !cfg.virtual_mode {
            self.state.arming.reset();
        }
        self.state.cfg = cfg;
        self.credentials = Some(Arc::new(credentials));
        self.state.running = true;
        self.halt_tx.send_replace(false);
        self.gate.begin();
        self.boot();
        Ok(())
    }

    fn reset_counters_and_views(&mut self) {
        self.state.ledger.reset();
        self.state.arming.reset();
        self.reporter
            .emit(UiEvent::ProfitLoss(self.state.ledger.snapshot()));
        self.reporter
            .emit(UiEvent::VirtualState(self.state.arming.snapshot()));
        self.reporter.emit(UiEvent::ViewsReset);
    }

    // ═════════════════════════════════════════════════
    // Boot / reboot / stop
    // ═════════════════════════════════════════════════

    /// Open a fresh pool for the next generation and start its startup task.
    fn boot(&mut self) {
        let Some(credentials) = self.credentials.clone() else {
            return;
        };
        self.generation += 1;
        self.state.ready = false;
        self.tick_seen.send_replace(HashSet::new());

        let timings = self.timings();
        let pool = SessionPool::open(
            &self.settings.ws_url,
            self.generation,
            self.session_tx.clone(),
            timings.session,
        );

        let ctx = StartupCtx {
            generation: self.generation,
            feed: pool.session(SessionKind::Feed),
            demo: pool.session(SessionKind::Demo),
            real: pool.session(SessionKind::Real),
            credentials,
            symbols: self.settings.symbols.clone(),
            virtual_mode: self.state.cfg.virtual_mode,
            timings,
            reporter: self.reporter.clone(),
            seen: self.tick_seen.subscribe(),
        };
        let tx = self.internal_tx.clone();
        self.startup_task = Some(tokio::spawn(async move {
            let generation = ctx.generation;
            let result = ctx.run().await;
            let _ = tx.send(Internal::StartupFinished { generation, result });
        }));
        self.pool = Some(pool);
    }

    async fn close_pool(&mut self) {
        if let Some(task) = self.startup_task.take() {
            task.abort();
        }
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
    }

    /// Tear everything down and boot again. Caller holds the gate.
    async fn reboot(&mut self, reason: &str) {
        self.reporter
            .warn("REBOOT", format!("{reason} | closing and reopening all sessions"));
        self.state.ready = false;
        self.close_pool().await;
        self.state.ledger.clear_live_balance();
        self.boot();
    }

    /// Halt new attempts, drain the in-flight run, close the pool.
    async fn stop_engine(&mut self) {
        let was_active = self.state.running || self.pool.is_some();
        self.state.running = false;
        self.state.ready = false;
        self.halt_tx.send_replace(true);
        if let Some(task) = self.startup_task.take() {
            task.abort();
        }
        self.gate.finish();

        if self.state.busy {
            self.reporter
                .log("ENGINE", "Stopping | waiting for the open run to settle");
            let deadline = Instant::now() + self.timings().drain_limit();
            while self.state.busy {
                match timeout_at(deadline, self.internal_rx.recv()).await {
                    Ok(Some(Internal::RunFinished(report))) => {
                        self.on_run_finished(report);
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => {
                        self.reporter
                            .warn("ENGINE", "Open run did not settle in time; closing anyway.");
                        break;
                    }
                }
            }
        }

        self.close_pool().await;
        if was_active {
            self.reporter.log("ENGINE", "Stopped.");
        }
    }

    // ═════════════════════════════════════════════════
    // Session events
    // ═════════════════════════════════════════════════

    async fn on_session_event(&mut self, ev: SessionEvent) {
        if ev.generation() != self.generation {
            return;
        }
        match ev {
            SessionEvent::Message { session, msg, .. } => match session {
                SessionKind::Feed => self.on_feed_message(&msg),
                SessionKind::Real => self.on_real_message(&msg),
                SessionKind::Demo => {}
            },
            SessionEvent::Disconnected { session, cause, .. } => {
                self.on_disconnect(session, cause).await;
            }
        }
    }

    fn on_feed_message(&mut self, msg: &Value) {
        let Some(tick) = protocol::parse_tick(msg) else {
            return;
        };
        if !self.settings.symbols.contains(&tick.symbol) {
            return;
        }
        self.tick_seen.send_if_modified(|seen| seen.insert(tick.symbol.clone()));
        if !self.state.running {
            return;
        }

        let price = format_quote(tick.quote, tick.pip_size);
        let decoded = decode(&price, self.state.cfg.trigger_mode);
        let digit = decoded
            .last_digit
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let parity = decoded.last_parity().map(|p| p.as_str()).unwrap_or("-");
        self.reporter.market(
            &tick.symbol,
            format!(
                "{} | {price} ----> {} - digit {digit} - {parity}",
                utc_ts(),
                decoded.trace()
            ),
        );

        let Some(direction) = decoded.signal else {
            return;
        };
        if let Some(plan) = self.state.admit(&tick.symbol, direction) {
            self.launch(plan);
        }
    }

    fn on_real_message(&mut self, msg: &Value) {
        let Some(balance) = protocol::parse_balance(msg) else {
            return;
        };
        let start = self.state.ledger.observe_balance(balance);
        self.reporter.emit(UiEvent::Balance { balance, start });
    }

    async fn on_disconnect(&mut self, session: SessionKind, cause: DerivError) {
        self.reporter
            .warn(session.label(), format!("Disconnected: {cause}"));
        if !self.state.running {
            return;
        }
        if !self.gate.try_begin(Instant::now()) {
            debug!(%session, "reboot suppressed (in progress or cooling down)");
            return;
        }
        self.reboot(&format!("{} dropped: {cause}", session.label()))
            .await;
    }

    // ═════════════════════════════════════════════════
    // Runs
    // ═════════════════════════════════════════════════

    fn launch(&mut self, plan: SignalPlan) {
        let Some(pool) = self.pool.as_ref() else {
            self.state.busy = false;
            return;
        };
        let venue = pool.session(plan.account.session());
        let run = ExecutionRun::new(
            plan.clone(),
            venue,
            self.halt_tx.subscribe(),
            self.reporter.clone(),
            self.timings(),
            self.settings.currency.clone(),
        );
        let id = run.id().to_string();
        let tx = self.internal_tx.clone();

        // Supervisor: the busy flag is only cleared by RunFinished, so it
        // must be sent even if the run task dies.
        tokio::spawn(async move {
            let report = match tokio::spawn(run.execute()).await {
                Ok(report) => report,
                Err(e) => RunReport {
                    id,
                    final_stake: plan.base_stake,
                    plan,
                    status: RunStatus::Error,
                    total_profit: Decimal::ZERO,
                    gales_used: 0,
                    error: Some(DerivError::ProtocolViolation(format!(
                        "execution task aborted: {e}"
                    ))),
                },
            };
            let _ = tx.send(Internal::RunFinished(report));
        });
    }

    /// Book a finished run. Returns true when stop-win was reached.
    fn on_run_finished(&mut self, report: RunReport) -> bool {
        let account = report.plan.account;
        debug!(run = %report.id, status = %report.status, profit = %report.total_profit, "run finished");

        let booking = self
            .state
            .book(account, report.status, report.total_profit);

        if booking.ledger {
            self.reporter
                .emit(UiEvent::ProfitLoss(self.state.ledger.snapshot()));
        }

        if booking.arming {
            match account {
                Account::Demo if booking.newly_armed => {
                    self.reporter
                        .log("VIRTUAL", "Trigger reached -> NEXT signal on REAL.");
                }
                Account::Real => {
                    self.reporter
                        .log("VIRTUAL", "Real signal finished -> back to DEMO.");
                }
                Account::Demo => {}
            }
            self.reporter
                .emit(UiEvent::VirtualState(self.state.arming.snapshot()));
        }

        if booking.stop_win {
            self.reporter.log(
                "STOP WIN",
                format!(
                    "Target reached: {:.2} >= {:.2}. Stopping engine.",
                    self.state.ledger.stop_win_metric(),
                    self.state.cfg.stop_win
                ),
            );
        }
        booking.stop_win
    }

    // ═════════════════════════════════════════════════
    // Internal events
    // ═════════════════════════════════════════════════

    async fn on_internal(&mut self, ev: Internal) {
        match ev {
            Internal::RunFinished(report) => {
                if self.on_run_finished(report) {
                    self.stop_engine().await;
                }
            }
            Internal::StartupFinished { generation, result } => {
                if generation != self.generation || !self.state.running {
                    return;
                }
                self.startup_task = None;
                self.gate.finish();
                match result {
                    Ok(outcome) => {
                        self.state.ready = true;
                        self.reporter.log(
                            "ENGINE",
                            format!(
                                "Running | ticks {}/{} demo_auth={} real_auth={}",
                                outcome.confirmed,
                                outcome.total,
                                outcome.demo_authorized,
                                outcome.real_authorized
                            ),
                        );
                    }
                    Err(e) => {
                        self.reporter
                            .warn("ENGINE", format!("Startup failed: {e}"));
                        let tx = self.internal_tx.clone();
                        let cooldown = self.timings().reboot_cooldown;
                        let reason = format!("startup failed: {e}");
                        tokio::spawn(async move {
                            sleep(cooldown).await;
                            let _ = tx.send(Internal::RetryReboot { generation, reason });
                        });
                    }
                }
            }
            Internal::RetryReboot { generation, reason } => {
                if generation != self.generation || !self.state.running {
                    return;
                }
                if self.gate.try_begin(Instant::now()) {
                    self.reboot(&reason).await;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Startup sequence
// ─────────────────────────────────────────────────────────

struct StartupCtx {
    generation: u64,
    feed: Arc<DerivSession>,
    demo: Arc<DerivSession>,
    real: Arc<DerivSession>,
    credentials: Arc<Credentials>,
    symbols: Vec<String>,
    virtual_mode: bool,
    timings: EngineTimings,
    reporter: Reporter,
    seen: watch::Receiver<HashSet<String>>,
}

impl StartupCtx {
    async fn run(mut self) -> Result<StartupOutcome> {
        sleep(self.timings.settle).await;

        let demo_authorized = self.authorize(&self.demo, &self.credentials.demo).await?;
        let real_authorized = self.authorize(&self.real, &self.credentials.real).await?;
        if self.virtual_mode && !demo_authorized {
            self.reporter
                .warn("ENGINE", "Virtual mode is on but DEMO is not authorized.");
        }
        if !real_authorized {
            self.reporter
                .warn("ENGINE", "REAL is not authorized (balance and real trades will fail).");
        }

        let confirmed = self.subscribe_ticks().await?;

        if real_authorized {
            self.subscribe_balance().await?;
        }

        info!(generation = self.generation, confirmed, "startup complete");
        Ok(StartupOutcome {
            demo_authorized,
            real_authorized,
            confirmed,
            total: self.symbols.len(),
        })
    }

    /// Blank token or venue rejection → not authorized. Transport failures
    /// abort the startup.
    async fn authorize(&self, session: &DerivSession, token: &SecretString) -> Result<bool> {
        let label = session.kind().label();
        if is_blank(token) {
            self.reporter.log(label, "Empty token (not authorized).");
            return Ok(false);
        }
        let resp = session
            .request(protocol::authorize(token), self.timings.request_timeout)
            .await?;
        if let Err(e) = protocol::check_error("authorize", &resp) {
            self.reporter.warn(label, format!("Authorize failed: {e}"));
            return Ok(false);
        }
        self.reporter.log(label, "Authorized.");
        Ok(true)
    }

    /// Fire-and-forget subscribes, confirmed by the first tick per symbol.
    async fn subscribe_ticks(&mut self) -> Result<usize> {
        let label = SessionKind::Feed.label();
        for symbol in &self.symbols {
            self.feed
                .send_only(&protocol::subscribe_ticks(symbol), self.timings.send_timeout)
                .await?;
        }
        self.wait_seen(self.timings.subscribe_window).await;

        let missing = self.missing();
        if !missing.is_empty() {
            self.reporter.log(
                label,
                format!("Retry subscribe ticks (missing {}).", missing.len()),
            );
            for symbol in &missing {
                self.feed
                    .send_only(&protocol::subscribe_ticks(symbol), self.timings.send_timeout)
                    .await?;
            }
            self.wait_seen(self.timings.subscribe_retry_window).await;
        }

        let confirmed = self.symbols.len() - self.missing().len();
        self.reporter.log(
            label,
            format!("Ticks active ({confirmed}/{}).", self.symbols.len()),
        );
        if confirmed == 0 {
            return Err(DerivError::Timeout {
                session: SessionKind::Feed,
                what: "first tick after subscribe",
            });
        }
        Ok(confirmed)
    }

    fn missing(&self) -> Vec<String> {
        let seen = self.seen.borrow();
        self.symbols
            .iter()
            .filter(|s| !seen.contains(*s))
            .cloned()
            .collect()
    }

    async fn wait_seen(&mut self, window: Duration) {
        let deadline = Instant::now() + window;
        loop {
            if self.missing().is_empty() {
                return;
            }
            match timeout_at(deadline, self.seen.changed()).await {
                Ok(Ok(())) => continue,
                _ => return,
            }
        }
    }

    async fn subscribe_balance(&self) -> Result<()> {
        let label = SessionKind::Real.label();
        let resp = self
            .real
            .request(protocol::subscribe_balance(), self.timings.request_timeout)
            .await?;
        match protocol::check_error("balance", &resp) {
            Ok(()) => self.reporter.log(label, "Balance subscribe ok."),
            Err(e) => self.reporter.warn(label, format!("Balance subscribe failed: {e}")),
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────
