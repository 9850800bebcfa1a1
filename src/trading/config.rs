//! Trading configuration.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for DCA sizing and take-profit placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Base capital in USDT that the DCA ratios are applied to
    pub capital: Decimal,

    /// Futures leverage applied to every entry
    pub leverage: u32,

    /// Take-profit distance from the average price (0.031 = 3.1%)
    pub take_profit_pct: Decimal,

    /// Fraction of capital per DCA step, index 0 is step 1
    pub dca_ratios: Vec<Decimal>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            capital: dec!(100),
            leverage: 3,
            take_profit_pct: dec!(0.031),
            dca_ratios: vec![dec!(0.167), dec!(0.167), dec!(0.333), dec!(0.333)],
        }
    }
}

impl TradingConfig {
    /// Load from environment variables, falling back to defaults:
    /// - CAPITAL_USDT
    /// - LEVERAGE
    /// - TP_PCT (percent like `3.1`, or a fraction like `0.031`)
    /// - DCA_RATIOS (comma separated, e.g. `0.167,0.167,0.333,0.333`)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let capital = env_or("CAPITAL_USDT", defaults.capital)?;
        let leverage = env_or("LEVERAGE", defaults.leverage)?;
        let take_profit_pct = match std::env::var("TP_PCT") {
            Ok(raw) => normalize_take_profit(
                Decimal::from_str(raw.trim()).context("Invalid TP_PCT")?,
            ),
            Err(_) => defaults.take_profit_pct,
        };
        let dca_ratios = match std::env::var("DCA_RATIOS") {
            Ok(raw) => parse_ratios(&raw)?,
            Err(_) => defaults.dca_ratios,
        };

        let config = Self {
            capital,
            leverage,
            take_profit_pct,
            dca_ratios,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capital <= Decimal::ZERO {
            bail!("CAPITAL_USDT must be positive, got {}", self.capital);
        }
        if self.leverage == 0 {
            bail!("LEVERAGE must be at least 1");
        }
        if self.take_profit_pct <= Decimal::ZERO || self.take_profit_pct >= Decimal::ONE {
            bail!("TP_PCT must be between 0 and 100%, got {}", self.take_profit_pct);
        }
        if self.dca_ratios.is_empty() {
            bail!("DCA_RATIOS must list at least one step");
        }
        Ok(())
    }
}

/// Values above 1 are read as a percentage, so `3.1` and `0.031` are the same.
pub fn normalize_take_profit(raw: Decimal) -> Decimal {
    if raw > Decimal::ONE {
        raw / dec!(100)
    } else {
        raw
    }
}

fn parse_ratios(raw: &str) -> Result<Vec<Decimal>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Decimal::from_str(s).with_context(|| format!("Invalid DCA ratio '{}'", s)))
        .collect()
}

/// Read and parse an environment variable, or return the default when unset.
pub(crate) fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_take_profit() {
        assert_eq!(normalize_take_profit(dec!(3.1)), dec!(0.031));
        assert_eq!(normalize_take_profit(dec!(0.031)), dec!(0.031));
        assert_eq!(normalize_take_profit(dec!(1)), dec!(1));
    }

    #[test]
    fn test_parse_ratios() {
        let ratios = parse_ratios("0.167, 0.167,0.333 ,0.333").unwrap();
        assert_eq!(ratios, vec![dec!(0.167), dec!(0.167), dec!(0.333), dec!(0.333)]);

        assert!(parse_ratios("0.1,abc").is_err());
    }

    #[test]
    fn test_default_is_valid() {
        let config = TradingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dca_ratios.len(), 4);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TradingConfig::default();
        config.leverage = 0;
        assert!(config.validate().is_err());

        let mut config = TradingConfig::default();
        config.take_profit_pct = dec!(1.5);
        assert!(config.validate().is_err());

        let mut config = TradingConfig::default();
        config.dca_ratios.clear();
        assert!(config.validate().is_err());
    }
}
