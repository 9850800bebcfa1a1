//! Webhook signal payload sent by the charting/alerting service.

use serde::Deserialize;

use crate::error::SignalError;

use super::PositionSide;

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
const QUOTE_ASSET: &str = "USDT";

/// Raw webhook body. Every field except the passphrase has a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub passphrase: Option<String>,

    #[serde(default)]
    pub symbol: Option<String>,

    #[serde(default)]
    pub side: Option<String>,

    #[serde(default)]
    pub action: Option<String>,

    /// DCA tranche, 1-based. Accepts `2`, `2.0` or `"2"`.
    #[serde(default)]
    pub step: Option<StepField>,
}

/// Raw `step` value as sent. Only entries resolve it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StepField {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl StepField {
    /// Integral step number. Range is left to the DCA table lookup.
    pub fn resolve(&self) -> Result<i64, SignalError> {
        match self {
            StepField::Integer(n) => Ok(*n),
            StepField::Float(f) => integral(*f)
                .ok_or_else(|| SignalError::BadRequest(format!("step {} is not an integer", f))),
            StepField::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(integral))
                    .ok_or_else(|| SignalError::BadRequest(format!("step '{}' is not an integer", s)))
            }
        }
    }
}

/// Saturating conversion of a whole float; out-of-range values fail the step lookup later.
fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// What a signal asks the bot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First tranche or additional DCA tranche
    Entry,
    /// Close everything (`exit`, `close` and `tp` are synonyms)
    Exit,
}

impl SignalAction {
    pub fn parse(s: &str) -> Result<Self, SignalError> {
        match s.trim().to_lowercase().as_str() {
            "entry" | "add" => Ok(SignalAction::Entry),
            "exit" | "close" | "tp" => Ok(SignalAction::Exit),
            other => Err(SignalError::UnknownAction(other.to_string())),
        }
    }
}

/// A validated signal with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub symbol: String,
    pub side: PositionSide,
    pub action: SignalAction,
    pub step: i64,
}

impl WebhookRequest {
    /// Apply defaults and normalize fields. Does not check the passphrase.
    pub fn into_signal(self) -> Result<Signal, SignalError> {
        let action = match self.action.as_deref() {
            Some(a) => SignalAction::parse(a)?,
            None => SignalAction::Entry,
        };

        let side = match self.side.as_deref() {
            Some(s) => PositionSide::parse(s)
                .ok_or_else(|| SignalError::BadRequest(format!("unknown side '{}'", s)))?,
            None => PositionSide::Long,
        };

        // Exits ignore the step, so a malformed one must not block closing
        let step = match action {
            SignalAction::Entry => self.step.as_ref().map(StepField::resolve).transpose()?,
            SignalAction::Exit => self.step.as_ref().and_then(|s| s.resolve().ok()),
        };

        Ok(Signal {
            symbol: normalize_symbol(self.symbol.as_deref().unwrap_or(DEFAULT_SYMBOL)),
            side,
            action,
            step: step.unwrap_or(1),
        })
    }
}

/// Normalize a ticker to the `BASEUSDT` form used as the state key.
///
/// `BTC/USDT`, `btc-usdt`, `BINANCE:BTCUSDT.P` and `btc` all become `BTCUSDT`.
pub fn normalize_symbol(raw: &str) -> String {
    let mut s = raw.trim().to_uppercase();

    // "BINANCE:BTCUSDT" carries an exchange prefix, "BTC/USDT:USDT" a settle suffix
    if let Some((left, right)) = s.split_once(':') {
        s = if right.is_empty() || right == QUOTE_ASSET {
            left.to_string()
        } else {
            right.to_string()
        };
    }

    // Perpetual marker, e.g. "BTCUSDT.P"
    if let Some(stripped) = s.strip_suffix(".P") {
        s = stripped.to_string();
    }

    let mut s: String = s
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '_' | ':' | ' '))
        .collect();

    if s.is_empty() {
        return DEFAULT_SYMBOL.to_string();
    }

    if !s.ends_with(QUOTE_ASSET) {
        s.push_str(QUOTE_ASSET);
    }
    s
}
