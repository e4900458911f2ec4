//! Parity Bot: console front end for the parity engine.
//!
//!   stdin commands ──→ EngineHandle ──→ Engine
//!   stdout         ←── UiEvent printer ←──┘
//!
//! Settings come from the environment (.env supported). Commands:
//! `start`, `stop`, `reset`, `quit`. Ctrl-C stops the engine and exits.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use deriv_parity::deriv::messages::{OperationRecord, OperationUpdate};
use deriv_parity::{Credentials, Engine, EngineHandle, EngineSettings, TradingConfig, UiEvent};

// ─────────────────────────────────────────────────────────
// Console settings
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ConsoleConfig {
    log_dir: PathBuf,
    filter: String,
    /// Emit every UiEvent as one JSON object per line.
    json: bool,
    show_ticks: bool,
    autostart: bool,
}

impl ConsoleConfig {
    fn from_env() -> Self {
        let flag = |key: &str, default: bool| {
            env::var(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(default)
        };
        Self {
            log_dir: env::var("PD_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            filter: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json: flag("PD_UI_JSON", false),
            show_ticks: flag("PD_SHOW_TICKS", true),
            autostart: flag("PD_AUTOSTART", true),
        }
    }
}

fn init_tracing(cfg: &ConsoleConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("failed to create log directory {:?}", cfg.log_dir))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&cfg.log_dir, "parity_bot.log"));

    // Console output belongs to the UI printer; tracing goes to stderr.
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(&cfg.filter));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(EnvFilter::new(&cfg.filter));
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

// ─────────────────────────────────────────────────────────
// UI printer
// ─────────────────────────────────────────────────────────

fn render(ev: &UiEvent, show_ticks: bool) -> Option<String> {
    match ev {
        UiEvent::Log(line) => Some(line.clone()),
        UiEvent::MarketTick { symbol, line } => show_ticks.then(|| format!("[{symbol}] {line}")),
        UiEvent::MarketExec { symbol, line } => Some(format!("[{symbol}] {line}")),
        UiEvent::OperationAdded(OperationRecord {
            id,
            time,
            symbol,
            account,
            direction,
            stake,
            gale,
            status,
        }) => Some(format!(
            "+ op {} | {time} | {account} | {symbol} | {direction} | stake={stake:.2} | gale={gale} | {status}",
            short_id(id)
        )),
        UiEvent::OperationUpdated(OperationUpdate {
            id,
            gale,
            status,
            profit,
        }) => Some(format!(
            "~ op {} | gale={gale} | {status} | profit={}",
            short_id(id),
            profit.map(|p| format!("{p:.2}")).unwrap_or_else(|| "-".to_string())
        )),
        UiEvent::Balance { balance, start } => Some(format!(
            "$ balance={balance:.2} start={}",
            start.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".to_string())
        )),
        UiEvent::ProfitLoss(pl) => Some(format!(
            "= W:{} L:{} P/L:{:.2}",
            pl.wins, pl.losses, pl.profit
        )),
        UiEvent::VirtualState(v) => Some(format!(
            "= virtual W:{} L:{} armed={}",
            v.vwin, v.vloss, v.armed
        )),
        UiEvent::ViewsReset => Some("= counters and views reset".to_string()),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

async fn print_ui(mut rx: mpsc::UnboundedReceiver<UiEvent>, cfg: ConsoleConfig) {
    while let Some(ev) = rx.recv().await {
        if cfg.json {
            match serde_json::to_string(&ev) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("ui event not serializable: {e}"),
            }
        } else if let Some(line) = render(&ev, cfg.show_ticks) {
            println!("{line}");
        }
    }
}

// ─────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────

async fn start(handle: &EngineHandle) {
    let result = match TradingConfig::from_env() {
        Ok(cfg) => handle.start(Credentials::from_env(), cfg).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("❌ start rejected: {e}");
    }
}

/// Returns false when the console should exit.
async fn on_command(handle: &EngineHandle, line: &str) -> bool {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => {}
        "start" => start(handle).await,
        "stop" => {
            if let Err(e) = handle.stop().await {
                error!("❌ stop failed: {e}");
            }
        }
        "reset" => {
            if let Err(e) = handle.reset_counters_and_views().await {
                error!("❌ reset failed: {e}");
            }
        }
        "quit" | "exit" => return false,
        other => warn!("unknown command '{other}' (start | stop | reset | quit)"),
    }
    true
}

// ─────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let console = ConsoleConfig::from_env();
    let _guard = init_tracing(&console)?;

    info!("═══════════════════════════════════════════════════");
    info!("  Parity Bot | Deriv digit parity engine");
    info!("═══════════════════════════════════════════════════");

    let settings = EngineSettings::from_env()?;
    info!(
        "📊 Settings: url={} symbols={} currency={}",
        settings.ws_url,
        settings.symbols.join(","),
        settings.currency
    );

    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_ui(ui_rx, console.clone()));
    let (handle, engine_task) = Engine::spawn(settings, ui_tx)?;

    if console.autostart {
        start(&handle).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Ctrl-C received");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !on_command(&handle, &line).await {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    stdin_open = false;
                }
            },
        }
    }

    if let Err(e) = handle.stop().await {
        warn!("stop on exit failed: {e}");
    }
    drop(handle);
    let _ = engine_task.await;
    let _ = printer.await;
    info!("👋 Parity Bot exited");
    Ok(())
}
