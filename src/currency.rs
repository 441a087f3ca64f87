// Currency - ISO 4217 codes and a daily-cached exchange-rate table
// Conversion is for display only; converted values are never written back.
use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::config::CurrencyConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid currency code: {0:?}")]
pub struct InvalidCurrency(pub String);

impl CurrencyCode {
    /// Accepts three ASCII letters in any case and normalises to upper case.
    pub fn parse(raw: &str) -> Result<Self, InvalidCurrency> {
        let trimmed = raw.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(InvalidCurrency(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = InvalidCurrency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Units of each currency per one unit of `base`, as fetched on `fetched_on`.
#[derive(Debug, Clone)]
pub struct RateTable {
    pub base: CurrencyCode,
    pub rates: HashMap<CurrencyCode, Decimal>,
    pub fetched_on: NaiveDate,
}

impl RateTable {
    pub fn rate(&self, code: &CurrencyCode) -> Option<Decimal> {
        if code == &self.base {
            return Some(Decimal::ONE);
        }
        self.rates.get(code).copied()
    }

    /// Convert through the base currency, rounded to cents and always shown with two decimals.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Option<Decimal> {
        if from == to {
            return Some(amount);
        }

        let from_rate = self.rate(from).filter(|r| !r.is_zero())?;
        let to_rate = self.rate(to)?;

        amount
            .checked_div(from_rate)?
            .checked_mul(to_rate)
            .map(|v| {
                let mut cents = v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                cents.rescale(2);
                cents
            })
    }
}

/// Where fresh rate tables come from.
pub trait RateSource: Send + Sync {
    fn fetch(&self, today: NaiveDate) -> anyhow::Result<RateTable>;
}

/// Rates fixed in configuration, restamped with the requested day.
pub struct StaticRateSource {
    base: CurrencyCode,
    rates: HashMap<CurrencyCode, Decimal>,
}

impl StaticRateSource {
    pub fn from_config(config: &CurrencyConfig) -> anyhow::Result<Self> {
        let base = CurrencyCode::parse(&config.base)?;
        let mut rates = HashMap::new();
        for (code, rate) in &config.rates {
            match CurrencyCode::parse(code) {
                Ok(code) if rate.is_sign_positive() && !rate.is_zero() => {
                    rates.insert(code, *rate);
                }
                _ => tracing::warn!("Ignoring exchange rate {} = {}", code, rate),
            }
        }
        Ok(Self { base, rates })
    }
}

impl RateSource for StaticRateSource {
    fn fetch(&self, today: NaiveDate) -> anyhow::Result<RateTable> {
        Ok(RateTable {
            base: self.base.clone(),
            rates: self.rates.clone(),
            fetched_on: today,
        })
    }
}

/// Serves conversions from one rate table per calendar day.
pub struct CurrencyConverter {
    source: Box<dyn RateSource>,
    cache: RwLock<Option<Arc<RateTable>>>,
}

impl CurrencyConverter {
    pub fn new(source: Box<dyn RateSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    pub fn from_config(config: &CurrencyConfig) -> Self {
        match StaticRateSource::from_config(config) {
            Ok(source) => Self::new(Box::new(source)),
            Err(e) => {
                tracing::warn!("Invalid currency config ({}), conversions disabled", e);
                Self::new(Box::new(StaticRateSource {
                    base: CurrencyCode("EUR".to_string()),
                    rates: HashMap::new(),
                }))
            }
        }
    }

    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Option<Decimal> {
        self.convert_on(amount, from, to, Utc::now().date_naive())
    }

    pub fn convert_on(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
        today: NaiveDate,
    ) -> Option<Decimal> {
        if from == to {
            return Some(amount);
        }
        self.table_for(today)?.convert(amount, from, to)
    }

    fn table_for(&self, today: NaiveDate) -> Option<Arc<RateTable>> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        if let Some(table) = &cached {
            if table.fetched_on >= today {
                return cached;
            }
        }

        match self.source.fetch(today) {
            Ok(table) => {
                tracing::debug!("Refreshed exchange rates for {}", today);
                let table = Arc::new(table);
                *self
                    .cache
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(table.clone());
                Some(table)
            }
            Err(e) => {
                tracing::warn!("Exchange rate refresh failed, serving cached rates: {}", e);
                cached
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn table() -> RateTable {
        RateTable {
            base: code("EUR"),
            rates: [(code("XOF"), dec!(655.957)), (code("USD"), dec!(1.08))]
                .into_iter()
                .collect(),
            fetched_on: day(1),
        }
    }

    #[test]
    fn parse_normalises_case_and_rejects_garbage() {
        assert_eq!(code("xof").as_str(), "XOF");
        assert!(CurrencyCode::parse("EURO").is_err());
        assert!(CurrencyCode::parse("E1R").is_err());
        assert!(CurrencyCode::parse("").is_err());
    }

    #[test]
    fn identity_conversion_returns_amount_unchanged() {
        assert_eq!(
            table().convert(dec!(12.345), &code("GBP"), &code("GBP")),
            Some(dec!(12.345))
        );
    }

    #[test]
    fn converts_through_base_currency() {
        let t = table();
        assert_eq!(
            t.convert(dec!(10), &code("EUR"), &code("XOF")),
            Some(dec!(6559.57))
        );
        assert_eq!(
            t.convert(dec!(6559.57), &code("XOF"), &code("EUR")),
            Some(dec!(10.00))
        );
        assert_eq!(
            t.convert(dec!(100), &code("USD"), &code("EUR")),
            Some(dec!(92.59))
        );
    }

    #[test]
    fn unknown_currency_yields_none() {
        assert_eq!(table().convert(dec!(10), &code("EUR"), &code("JPY")), None);
        assert_eq!(table().convert(dec!(10), &code("JPY"), &code("EUR")), None);
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        fail_after: usize,
    }

    impl RateSource for CountingSource {
        fn fetch(&self, today: NaiveDate) -> anyhow::Result<RateTable> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                anyhow::bail!("rate provider unavailable");
            }
            Ok(RateTable {
                fetched_on: today,
                ..table()
            })
        }
    }

    #[test]
    fn converter_fetches_once_per_day() {
        let calls = Arc::new(AtomicUsize::new(0));
        let converter = CurrencyConverter::new(Box::new(CountingSource {
            calls: calls.clone(),
            fail_after: usize::MAX,
        }));

        for _ in 0..3 {
            converter.convert_on(dec!(1), &code("EUR"), &code("USD"), day(2));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        converter.convert_on(dec!(1), &code("EUR"), &code("USD"), day(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn converter_serves_stale_rates_when_refresh_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let converter = CurrencyConverter::new(Box::new(CountingSource {
            calls: calls.clone(),
            fail_after: 1,
        }));

        assert_eq!(
            converter.convert_on(dec!(10), &code("EUR"), &code("USD"), day(2)),
            Some(dec!(10.80))
        );
        assert_eq!(
            converter.convert_on(dec!(10), &code("EUR"), &code("USD"), day(5)),
            Some(dec!(10.80))
        );
    }

    #[test]
    fn static_source_skips_invalid_entries() {
        let mut config = CurrencyConfig::default();
        config.rates.insert("BAD1".to_string(), dec!(2));
        config.rates.insert("ZZZ".to_string(), dec!(0));
        let source = StaticRateSource::from_config(&config).unwrap();
        let t = source.fetch(day(1)).unwrap();
        assert!(t.rate(&code("XOF")).is_some());
        assert!(t.rate(&code("ZZZ")).is_none());
    }
}
