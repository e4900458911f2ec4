use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::error::{DerivError, Result};
use super::types::{round_money, TriggerMode};

pub const DEFAULT_WS_URL: &str = "wss://ws.derivws.com/websockets/v3?app_id=122601";

pub const DEFAULT_SYMBOLS: [&str; 12] = [
    "R_10", "R_25", "R_50", "R_75", "R_100", "1HZ10V", "1HZ25V", "1HZ50V", "1HZ75V", "1HZ100V",
    "RDBULL", "RDBEAR",
];

// ─────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────

/// Reconnect backoff of a transport session.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub floor: Duration,
    pub ceiling: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(20),
            factor: 1.7,
        }
    }
}

impl BackoffPolicy {
    pub fn next(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor).min(self.ceiling)
    }
}

/// Per-session transport timing.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    pub backoff: BackoffPolicy,
    pub connect_timeout: Duration,
    /// Inbound silence before a ping is sent; the same again without
    /// any frame drops the connection.
    pub heartbeat: Duration,
    /// Pause before a failed request is re-sent.
    pub retry_pause: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat: Duration::from_secs(20),
            retry_pause: Duration::from_millis(150),
        }
    }
}

/// Engine-level windows and deadlines.
#[derive(Debug, Clone, Copy)]
pub struct EngineTimings {
    pub session: SessionTimings,
    /// Delay between opening the sessions and authorizing.
    pub settle: Duration,
    pub request_timeout: Duration,
    pub send_timeout: Duration,
    pub subscribe_window: Duration,
    pub subscribe_retry_window: Duration,
    pub poll_interval: Duration,
    pub settlement_deadline: Duration,
    pub reboot_cooldown: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            session: SessionTimings::default(),
            settle: Duration::from_secs(1),
            request_timeout: Duration::from_secs(45),
            send_timeout: Duration::from_secs(35),
            subscribe_window: Duration::from_secs(25),
            subscribe_retry_window: Duration::from_secs(20),
            poll_interval: Duration::from_millis(120),
            settlement_deadline: Duration::from_secs(35),
            reboot_cooldown: Duration::from_secs(2),
        }
    }
}

impl EngineTimings {
    /// Longest a stop waits for an in-flight run before closing sessions.
    pub fn drain_limit(&self) -> Duration {
        self.settlement_deadline + self.request_timeout
    }
}

// ─────────────────────────────────────────────────────────
// Engine settings (fixed for the process lifetime)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub ws_url: String,
    pub symbols: Vec<String>,
    pub currency: String,
    pub timings: EngineTimings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            currency: "USD".to_string(),
            timings: EngineTimings::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self> {
        let mut s = Self::default();
        if let Ok(v) = env::var("DERIV_WS_URL") {
            s.ws_url = v;
        }
        if let Ok(v) = env::var("DERIV_SYMBOLS") {
            s.symbols = v
                .split(',')
                .map(str::trim)
                .filter(|sym| !sym.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(v) = env::var("DERIV_CURRENCY") {
            s.currency = v.trim().to_uppercase();
        }
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.ws_url).map_err(|e| {
            DerivError::Configuration(format!("invalid websocket url '{}': {e}", self.ws_url))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(DerivError::Configuration(format!(
                "websocket url must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }
        if self.symbols.is_empty() {
            return Err(DerivError::Configuration("symbol list is empty".to_string()));
        }
        if self.currency.is_empty() {
            return Err(DerivError::Configuration("currency is empty".to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Trading configuration (supplied with every start)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TradingConfig {
    pub virtual_mode: bool,
    /// Demo win streak that arms the next real trade. 0 disables.
    pub vwin_target: u32,
    /// Demo loss streak that arms the next real trade. 0 disables.
    pub vloss_target: u32,
    pub trigger_mode: TriggerMode,
    pub stake: Decimal,
    pub max_gale: u32,
    pub mult: Decimal,
    /// Growth at which the engine stops itself. 0 disables.
    pub stop_win: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            virtual_mode: false,
            vwin_target: 0,
            vloss_target: 0,
            trigger_mode: TriggerMode::TrendFollowing,
            stake: Decimal::ONE,
            max_gale: 0,
            mult: Decimal::from(2),
            stop_win: Decimal::ZERO,
        }
    }
}

impl TradingConfig {
    /// Read `PD_*` overrides. Values that are present but unparsable are
    /// configuration errors.
    pub fn from_env() -> Result<Self> {
        let mut c = Self::default();
        if let Some(v) = env_value("PD_VIRTUAL_MODE") {
            c.virtual_mode = parse_bool("PD_VIRTUAL_MODE", &v)?;
        }
        if let Some(v) = env_value("PD_VWIN_TARGET") {
            c.vwin_target = parse_field("PD_VWIN_TARGET", &v)?;
        }
        if let Some(v) = env_value("PD_VLOSS_TARGET") {
            c.vloss_target = parse_field("PD_VLOSS_TARGET", &v)?;
        }
        if let Some(v) = env_value("PD_TRIGGER_MODE") {
            c.trigger_mode = v.parse()?;
        }
        if let Some(v) = env_value("PD_STAKE") {
            c.stake = parse_money("PD_STAKE", &v)?;
        }
        if let Some(v) = env_value("PD_MAX_GALE") {
            c.max_gale = parse_field("PD_MAX_GALE", &v)?;
        }
        if let Some(v) = env_value("PD_MULT") {
            c.mult = parse_field("PD_MULT", &v.replace(',', "."))?;
        }
        if let Some(v) = env_value("PD_STOP_WIN") {
            c.stop_win = parse_money("PD_STOP_WIN", &v)?;
        }
        Ok(c)
    }

    /// Check invariants and normalise money fields to the minor unit.
    pub fn validated(mut self) -> Result<Self> {
        self.stake = round_money(self.stake);
        self.stop_win = round_money(self.stop_win);
        if self.stake <= Decimal::ZERO {
            return Err(DerivError::Configuration(format!(
                "stake must be > 0, got {}",
                self.stake
            )));
        }
        if self.stop_win < Decimal::ZERO {
            return Err(DerivError::Configuration(format!(
                "stop_win must be >= 0, got {}",
                self.stop_win
            )));
        }
        if self.mult <= Decimal::ZERO {
            return Err(DerivError::Configuration(format!(
                "mult must be > 0, got {}",
                self.mult
            )));
        }
        Ok(self)
    }
}

/// Bearer tokens for the two trading accounts. Empty means "do not authorize".
#[derive(Debug)]
pub struct Credentials {
    pub demo: SecretString,
    pub real: SecretString,
}

impl Credentials {
    pub fn new(demo: impl Into<String>, real: impl Into<String>) -> Self {
        Self {
            demo: SecretString::from(demo.into()),
            real: SecretString::from(real.into()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            env::var("DERIV_DEMO_TOKEN").unwrap_or_default(),
            env::var("DERIV_REAL_TOKEN").unwrap_or_default(),
        )
    }
}

pub fn is_blank(token: &SecretString) -> bool {
    token.expose_secret().trim().is_empty()
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_field<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| DerivError::Configuration(format!("{key}='{raw}': {e}")))
}

fn parse_money(key: &str, raw: &str) -> Result<Decimal> {
    parse_field::<Decimal>(key, &raw.replace(',', "."))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DerivError::Configuration(format!("{key}='{raw}': expected a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_backoff_grows_to_ceiling() {
        let policy = BackoffPolicy::default();
        let mut d = policy.floor;
        let mut steps = Vec::new();
        for _ in 0..8 {
            d = policy.next(d);
            steps.push(d);
        }
        let first = steps[0].as_millis();
        assert!((1699..=1700).contains(&first), "{first}");
        assert!(steps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*steps.last().unwrap(), Duration::from_secs(20));
    }

    #[test]
    fn test_validated_rounds_and_rejects() {
        let cfg = TradingConfig {
            stake: dec!(0.355),
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(cfg.stake, dec!(0.36));

        let bad_stake = TradingConfig {
            stake: dec!(0),
            ..Default::default()
        };
        assert!(matches!(bad_stake.validated(), Err(DerivError::Configuration(_))));

        let bad_stop = TradingConfig {
            stop_win: dec!(-1),
            ..Default::default()
        };
        assert!(matches!(bad_stop.validated(), Err(DerivError::Configuration(_))));

        let bad_mult = TradingConfig {
            mult: dec!(0),
            ..Default::default()
        };
        assert!(bad_mult.validated().is_err());
    }

    #[test]
    fn test_parse_helpers_are_strict() {
        assert_eq!(parse_money("PD_STAKE", "1,5").unwrap(), dec!(1.5));
        assert!(parse_field::<u32>("PD_MAX_GALE", "-1").is_err());
        assert!(parse_field::<u32>("PD_MAX_GALE", "two").is_err());
        assert!(parse_bool("PD_VIRTUAL_MODE", "maybe").is_err());
        assert!(parse_bool("PD_VIRTUAL_MODE", "ON").unwrap());
    }

    #[test]
    fn test_settings_validation() {
        assert!(EngineSettings::default().validate().is_ok());
        let http = EngineSettings {
            ws_url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert!(http.validate().is_err());
        let empty = EngineSettings {
            symbols: Vec::new(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_blank_tokens() {
        let creds = Credentials::new("  ", "abc");
        assert!(is_blank(&creds.demo));
        assert!(!is_blank(&creds.real));
    }
}
