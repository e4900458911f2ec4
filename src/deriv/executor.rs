//! Execution State Machine: one signal plan, start to finish.
//!
//! Per attempt: proposal → buy → poll until the contract is sold.
//! A lost attempt with gale depth left re-proposes at `stake × mult`
//! (rounded to the minor unit each step); anything else is terminal.
//!
//!   OPEN ─won──────────────→ WIN
//!   OPEN ─lost, depth left─→ OPEN (next gale)
//!   OPEN ─lost, exhausted──→ LOSS
//!   OPEN ─venue/poll error─→ ERROR
//!   OPEN ─halt requested───→ STOP   (checked before each proposal)
//!
//! A run owns no shared state. The engine books its `RunReport`.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::debug;
use uuid::Uuid;

use super::config::EngineTimings;
use super::error::{DerivError, Result};
use super::messages::{utc_ts, OperationRecord, OperationUpdate, Reporter, UiEvent};
use super::protocol;
use super::session::VenueApi;
use super::types::{next_stake, round_money, RunStatus, Settlement, SignalPlan};

/// Outcome of a finished run, handed back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub id: String,
    pub plan: SignalPlan,
    pub status: RunStatus,
    pub total_profit: Decimal,
    pub gales_used: u32,
    pub final_stake: Decimal,
    pub error: Option<DerivError>,
}

pub struct ExecutionRun<V: VenueApi> {
    id: String,
    plan: SignalPlan,
    venue: Arc<V>,
    halt: watch::Receiver<bool>,
    reporter: Reporter,
    timings: EngineTimings,
    currency: String,
}

impl<V: VenueApi> ExecutionRun<V> {
    pub fn new(
        plan: SignalPlan,
        venue: Arc<V>,
        halt: watch::Receiver<bool>,
        reporter: Reporter,
        timings: EngineTimings,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plan,
            venue,
            halt,
            reporter,
            timings,
            currency: currency.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn halted(&self) -> bool {
        *self.halt.borrow()
    }

    pub async fn execute(self) -> RunReport {
        let plan = &self.plan;
        let channel = plan.account.as_str();
        let mut stake = round_money(plan.base_stake);

        self.reporter.exec(
            &plan.symbol,
            format!(
                "{} | EXEC OPEN | {} | {} | {} | stake={:.2} | gale_max={} | mult={}",
                utc_ts(),
                plan.account,
                plan.symbol,
                plan.direction,
                stake,
                plan.max_gale,
                plan.mult
            ),
        );
        self.reporter.emit(UiEvent::OperationAdded(OperationRecord {
            id: self.id.clone(),
            time: utc_ts(),
            symbol: plan.symbol.clone(),
            account: plan.account,
            direction: plan.direction,
            stake,
            gale: 0,
            status: RunStatus::Open,
        }));

        let mut total = Decimal::ZERO;
        let mut gale = 0u32;
        let (status, error) = loop {
            if self.halted() {
                break (RunStatus::Stopped, None);
            }

            let settled = match self.attempt(stake).await {
                Ok(s) => s,
                Err(e) => {
                    self.reporter
                        .warn(channel, format!("{} run failed at gale {gale}: {e}", plan.symbol));
                    break (RunStatus::Error, Some(e));
                }
            };

            total += settled.profit;
            let attempt_status = if settled.won {
                RunStatus::Won
            } else {
                RunStatus::Lost
            };
            self.update(gale, attempt_status, Some(total));

            if settled.won {
                break (RunStatus::Won, None);
            }
            if gale >= plan.max_gale {
                break (RunStatus::Lost, None);
            }

            gale += 1;
            stake = next_stake(stake, plan.mult);
            self.reporter.log(
                channel,
                format!(
                    "GALE {gale}/{} {} {} stake={stake:.2}",
                    plan.max_gale, plan.symbol, plan.direction
                ),
            );
        };

        // Per-attempt updates already carry WIN/LOSS.
        if matches!(status, RunStatus::Error | RunStatus::Stopped) {
            self.update(gale, status, Some(total));
        }

        let total = round_money(total);
        self.reporter.exec(
            &plan.symbol,
            format!(
                "{} | EXEC CLOSE | {} | {} | {} | result={} | profit_total={:.2} | gales_used={}",
                utc_ts(),
                plan.account,
                plan.symbol,
                plan.direction,
                status,
                total,
                gale
            ),
        );

        RunReport {
            id: self.id.clone(),
            plan: self.plan.clone(),
            status,
            total_profit: total,
            gales_used: gale,
            final_stake: stake,
            error,
        }
    }

    fn update(&self, gale: u32, status: RunStatus, profit: Option<Decimal>) {
        self.reporter.emit(UiEvent::OperationUpdated(OperationUpdate {
            id: self.id.clone(),
            gale,
            status,
            profit: profit.map(round_money),
        }));
    }

    /// One proposal → buy → settlement cycle at `stake`.
    async fn attempt(&self, stake: Decimal) -> Result<Settlement> {
        let plan = &self.plan;
        let resp = self
            .venue
            .call(
                protocol::proposal(&plan.symbol, plan.direction, stake, &self.currency),
                self.timings.request_timeout,
            )
            .await?;
        let proposal_id = protocol::proposal_id(&resp)?;

        let resp = self
            .venue
            .call(protocol::buy(&proposal_id, stake), self.timings.request_timeout)
            .await?;
        let contract_id = protocol::contract_id(&resp)?;
        debug!(run = %self.id, %contract_id, %stake, "contract bought");

        self.await_settlement(&contract_id).await
    }

    /// Poll the contract until sold. Bounded by the settlement deadline,
    /// and never interrupted by a halt: a bought contract is always booked.
    async fn await_settlement(&self, contract_id: &Value) -> Result<Settlement> {
        let deadline = Instant::now() + self.timings.settlement_deadline;
        while Instant::now() < deadline {
            let budget = self
                .timings
                .request_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            let resp = self
                .venue
                .call(protocol::open_contract(contract_id), budget)
                .await?;
            if let Some(settled) = protocol::settlement(&resp)? {
                return Ok(settled);
            }
            sleep(self.timings.poll_interval).await;
        }
        Err(DerivError::Timeout {
            session: self.venue.kind(),
            what: "contract settlement",
        })
    }
}
