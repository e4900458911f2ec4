//! Wire protocol: JSON frames exchanged with the venue.
//!
//! Builders for every outbound request and parsers for every inbound
//! message kind the engine consumes. Nothing outside this module knows
//! the shape of a venue frame.

use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::error::{DerivError, Result};
use super::types::{Parity, Settlement, Tick};

/// Field the venue echoes back on correlated responses.
pub const REQ_ID: &str = "req_id";

// ─────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────

pub fn authorize(token: &SecretString) -> Value {
    json!({ "authorize": token.expose_secret().trim() })
}

pub fn subscribe_ticks(symbol: &str) -> Value {
    json!({ "ticks": symbol, "subscribe": 1 })
}

pub fn subscribe_balance() -> Value {
    json!({ "balance": 1, "subscribe": 1 })
}

/// Price proposal for a one-tick digit parity contract.
pub fn proposal(symbol: &str, direction: Parity, stake: Decimal, currency: &str) -> Value {
    json!({
        "proposal": 1,
        "amount": money_number(stake),
        "basis": "stake",
        "contract_type": direction.contract_type(),
        "currency": currency,
        "duration": 1,
        "duration_unit": "t",
        "symbol": symbol,
    })
}

pub fn buy(proposal_id: &str, price: Decimal) -> Value {
    json!({ "buy": proposal_id, "price": money_number(price) })
}

pub fn open_contract(contract_id: &Value) -> Value {
    json!({ "proposal_open_contract": 1, "contract_id": contract_id })
}

/// JSON number nearest to the decimal amount (`1.50` goes out as `1.5`).
fn money_number(value: Decimal) -> Value {
    match value.to_string().parse::<f64>() {
        Ok(f) if f.is_finite() => json!(f),
        _ => json!(value.to_string()),
    }
}

// ─────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────

pub fn msg_type(msg: &Value) -> Option<&str> {
    msg.get("msg_type").and_then(Value::as_str)
}

pub fn req_id(msg: &Value) -> Option<u64> {
    msg.get(REQ_ID).and_then(Value::as_u64)
}

/// Attach a correlation id to an outbound request object.
pub fn with_req_id(mut payload: Value, id: u64) -> Result<Value> {
    let Some(obj) = payload.as_object_mut() else {
        return Err(DerivError::ProtocolViolation(format!(
            "request payload is not an object: {payload}"
        )));
    };
    obj.insert(REQ_ID.to_string(), json!(id));
    Ok(payload)
}

/// Turn a response carrying an `error` object into a venue error.
pub fn check_error(stage: &'static str, msg: &Value) -> Result<()> {
    let Some(err) = msg.get("error") else {
        return Ok(());
    };
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    let code = err.get("code").and_then(Value::as_str).map(str::to_string);
    Err(DerivError::Venue {
        stage,
        code,
        message,
    })
}

pub fn parse_tick(msg: &Value) -> Option<Tick> {
    if msg_type(msg) != Some("tick") {
        return None;
    }
    let tick = msg.get("tick")?;
    let symbol = tick.get("symbol")?.as_str()?.to_string();
    let quote = parse_f64_field(tick, "quote")?;
    let pip_size = tick.get("pip_size").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .or_else(|| v.as_str().and_then(|s| s.parse::<u64>().ok()))
            .and_then(|p| u32::try_from(p).ok())
    });
    let epoch = tick.get("epoch").and_then(Value::as_i64);
    Some(Tick {
        symbol,
        quote,
        pip_size,
        epoch,
    })
}

pub fn parse_balance(msg: &Value) -> Option<Decimal> {
    if msg_type(msg) != Some("balance") {
        return None;
    }
    msg.get("balance")
        .and_then(|b| b.get("balance"))
        .and_then(parse_decimal)
}

pub fn proposal_id(msg: &Value) -> Result<String> {
    check_error("proposal", msg)?;
    msg.get("proposal")
        .and_then(|p| p.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DerivError::ProtocolViolation("proposal without id".to_string()))
}

pub fn contract_id(msg: &Value) -> Result<Value> {
    check_error("buy", msg)?;
    msg.get("buy")
        .and_then(|b| b.get("contract_id"))
        .filter(|id| match id {
            Value::Number(_) => true,
            Value::String(s) => !s.is_empty(),
            _ => false,
        })
        .cloned()
        .ok_or_else(|| DerivError::ProtocolViolation("buy without contract_id".to_string()))
}

/// `Ok(None)` while the contract is still open.
pub fn settlement(msg: &Value) -> Result<Option<Settlement>> {
    check_error("proposal_open_contract", msg)?;
    let Some(poc) = msg.get("proposal_open_contract") else {
        return Err(DerivError::ProtocolViolation(
            "contract status without proposal_open_contract".to_string(),
        ));
    };
    if !truthy(poc.get("is_sold")) {
        return Ok(None);
    }
    let profit = poc
        .get("profit")
        .and_then(parse_decimal)
        .unwrap_or(Decimal::ZERO);
    let won = poc.get("status").and_then(Value::as_str) == Some("won");
    Ok(Some(Settlement { won, profit }))
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        _ => false,
    }
}

/// Parse a money field given either as a JSON number or a numeric string.
pub fn parse_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn parse_f64_field(val: &Value, field: &str) -> Option<f64> {
    val.get(field).and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_proposal_frame() {
        let p = proposal("R_10", Parity::Odd, dec!(1.50), "USD");
        assert_eq!(p["contract_type"], "DIGITODD");
        assert_eq!(p["amount"], json!(1.5));
        assert_eq!(p["duration_unit"], "t");
        assert_eq!(p["symbol"], "R_10");
    }

    #[test]
    fn test_with_req_id_rejects_non_object() {
        let ok = with_req_id(json!({"ping": 1}), 7).unwrap();
        assert_eq!(ok["req_id"], 7);
        assert!(matches!(
            with_req_id(json!([1, 2]), 1),
            Err(DerivError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_parse_tick() {
        let msg = json!({
            "msg_type": "tick",
            "tick": {"symbol": "R_50", "quote": 246.8, "pip_size": 4, "epoch": 1700000000}
        });
        let tick = parse_tick(&msg).unwrap();
        assert_eq!(tick.symbol, "R_50");
        assert_eq!(tick.pip_size, Some(4));
        assert_eq!(tick.epoch, Some(1_700_000_000));
        assert!(parse_tick(&json!({"msg_type": "balance"})).is_none());
    }

    #[test]
    fn test_venue_error_surfaces_message() {
        let msg = json!({"error": {"code": "InvalidToken", "message": "The token is invalid."}});
        match proposal_id(&msg) {
            Err(DerivError::Venue { stage, code, message }) => {
                assert_eq!(stage, "proposal");
                assert_eq!(code.as_deref(), Some("InvalidToken"));
                assert_eq!(message, "The token is invalid.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_ids_are_protocol_violations() {
        assert!(matches!(
            proposal_id(&json!({"proposal": {}})),
            Err(DerivError::ProtocolViolation(_))
        ));
        assert!(matches!(
            contract_id(&json!({"buy": {"contract_id": ""}})),
            Err(DerivError::ProtocolViolation(_))
        ));
        assert_eq!(
            contract_id(&json!({"buy": {"contract_id": 42}})).unwrap(),
            json!(42)
        );
    }

    #[test]
    fn test_settlement_states() {
        let open = json!({"proposal_open_contract": {"is_sold": 0}});
        assert_eq!(settlement(&open).unwrap(), None);

        let lost = json!({"proposal_open_contract": {"is_sold": 1, "status": "lost", "profit": -1}});
        assert_eq!(
            settlement(&lost).unwrap(),
            Some(Settlement { won: false, profit: dec!(-1) })
        );

        let won = json!({"proposal_open_contract": {"is_sold": 1, "status": "won", "profit": "0.95"}});
        assert_eq!(
            settlement(&won).unwrap(),
            Some(Settlement { won: true, profit: dec!(0.95) })
        );
    }

    #[test]
    fn test_parse_balance() {
        let msg = json!({"msg_type": "balance", "balance": {"balance": 110.25, "currency": "USD"}});
        assert_eq!(parse_balance(&msg), Some(dec!(110.25)));
    }
}
