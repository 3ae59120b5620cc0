#![allow(dead_code)]

use chrono::{DateTime, Days, NaiveDate, Utc};
pub use marketlens::domain::bar::Bar;
use marketlens::domain::alert::{AlertEvent, AlertRule, NewAlertEvent};
use marketlens::domain::error::MarketLensError;
use marketlens::domain::instrument::{Instrument, InstrumentKind};
use marketlens::domain::universe::{Member, MembershipHistory, MembershipSnapshot};
use marketlens::ports::alert_port::AlertPort;
use marketlens::ports::data_port::DataPort;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockDataPort {
    pub instruments: Vec<Instrument>,
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
    pub membership: HashMap<String, MembershipHistory>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            instruments: Vec::new(),
            data: HashMap::new(),
            errors: HashMap::new(),
            membership: HashMap::new(),
        }
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.retain(|i| i.symbol != instrument.symbol);
        self.instruments.push(instrument);
        self
    }

    /// Registers `symbol` as a stock (or an index when it starts with `^`).
    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        if !self.instruments.iter().any(|i| i.symbol == symbol) {
            let instrument = if symbol.starts_with('^') {
                Instrument::index(symbol, None)
            } else {
                Instrument::stock(symbol, None)
            };
            self.instruments.push(instrument);
        }
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        if !self.instruments.iter().any(|i| i.symbol == symbol) {
            self.instruments.push(Instrument::stock(symbol, None));
        }
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    /// Also registers `index` as an index instrument.
    pub fn with_membership(mut self, index: &str, as_of: NaiveDate, symbols: &[&str]) -> Self {
        if !self.instruments.iter().any(|i| i.symbol == index) {
            self.instruments.push(Instrument::index(index, None));
        }
        let members = symbols
            .iter()
            .map(|s| Member {
                symbol: s.to_string(),
                name: None,
                date_first_added: None,
            })
            .collect();
        self.membership
            .entry(index.to_string())
            .or_default()
            .replace_snapshot(as_of, members);
        self
    }

    fn check(&self, symbol: &str) -> Result<(), MarketLensError> {
        match self.errors.get(symbol) {
            Some(reason) => Err(MarketLensError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, MarketLensError> {
        Ok(self.instruments.iter().find(|i| i.symbol == symbol).cloned())
    }

    fn list_instruments(&self, kind: InstrumentKind) -> Result<Vec<Instrument>, MarketLensError> {
        let mut out: Vec<Instrument> = self
            .instruments
            .iter()
            .filter(|i| i.kind == kind)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(out)
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, MarketLensError> {
        self.check(symbol)?;
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MarketLensError> {
        self.check(symbol)?;
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }

    fn latest_membership_as_of(
        &self,
        index: &str,
        as_of: NaiveDate,
    ) -> Result<Option<MembershipSnapshot>, MarketLensError> {
        Ok(self
            .membership
            .get(index)
            .and_then(|h| h.as_of(index, as_of)))
    }
}

/// In-memory rule/event store with the `(rule, bar date)` uniqueness the
/// real store enforces.
pub struct MockAlertPort {
    pub rules: RefCell<Vec<AlertRule>>,
    pub events: RefCell<Vec<AlertEvent>>,
    pub insert_calls: RefCell<usize>,
}

impl MockAlertPort {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: RefCell::new(rules),
            events: RefCell::new(Vec::new()),
            insert_calls: RefCell::new(0),
        }
    }

    pub fn rule(&self, id: i64) -> AlertRule {
        self.rules
            .borrow()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap()
    }
}

impl AlertPort for MockAlertPort {
    fn enabled_rules(&self, owner: &str) -> Result<Vec<AlertRule>, MarketLensError> {
        Ok(self
            .rules
            .borrow()
            .iter()
            .filter(|r| r.owner == owner && r.enabled)
            .cloned()
            .collect())
    }

    fn insert_event(&self, event: &NewAlertEvent) -> Result<bool, MarketLensError> {
        *self.insert_calls.borrow_mut() += 1;
        let mut events = self.events.borrow_mut();
        if events
            .iter()
            .any(|e| e.rule_id == event.rule_id && e.bar_date == event.bar_date)
        {
            return Ok(false);
        }
        let symbol = self.rule(event.rule_id).symbol;
        let id = events.len() as i64 + 1;
        events.push(AlertEvent {
            id,
            rule_id: event.rule_id,
            symbol,
            bar_date: event.bar_date,
            message: event.message.clone(),
            created_at: event.created_at,
        });
        Ok(true)
    }

    fn mark_triggered(&self, rule_id: i64, bar_date: NaiveDate) -> Result<(), MarketLensError> {
        if let Some(rule) = self.rules.borrow_mut().iter_mut().find(|r| r.id == rule_id) {
            rule.last_triggered_date = Some(bar_date);
        }
        Ok(())
    }

    fn latest_events(&self, owner: &str, limit: usize) -> Result<Vec<AlertEvent>, MarketLensError> {
        let owned: Vec<i64> = self
            .rules
            .borrow()
            .iter()
            .filter(|r| r.owner == owner)
            .map(|r| r.id)
            .collect();
        let mut events: Vec<AlertEvent> = self
            .events
            .borrow()
            .iter()
            .filter(|e| owned.contains(&e.rule_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        events.truncate(limit);
        Ok(events)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> Bar {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap();
    Bar::new(date, close, close, close, close, 1000)
}

/// Consecutive calendar-day bars starting at `start`, one per close.
pub fn generate_bars(start: NaiveDate, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(start + Days::new(i as u64), c, c, c, c, 1000))
        .collect()
}

/// `n` bars rising by `step` from `from`.
pub fn ramp(start: NaiveDate, from: f64, step: f64, n: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n).map(|i| from + step * i as f64).collect();
    generate_bars(start, &closes)
}

pub fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-02T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}
