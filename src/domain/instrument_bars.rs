//! Per-instrument bar sets for cross-sectional scans.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::aggregate::aggregate;
use crate::domain::bar::{self, Bar};
use crate::domain::error::MarketLensError;
use crate::domain::instrument::Instrument;
use crate::domain::query::Resolution;
use crate::domain::universe::Universe;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone)]
pub struct InstrumentBars {
    pub instrument: Instrument,
    pub bars: Vec<Bar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl InstrumentBars {
    pub fn new(instrument: Instrument, bars: Vec<Bar>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            instrument,
            bars,
            date_index,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.instrument.symbol
    }

    pub fn name(&self) -> Option<String> {
        self.instrument.name.clone()
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn closes(&self) -> Vec<Option<f64>> {
        bar::closes(&self.bars)
    }

    pub fn volumes(&self) -> Vec<Option<f64>> {
        bar::volumes(&self.bars)
    }

    /// Keep only bars with a close, as required by close-to-close scans.
    pub fn with_closes_only(&self) -> InstrumentBars {
        let bars = self
            .bars
            .iter()
            .filter(|b| b.close.is_some())
            .cloned()
            .collect();
        InstrumentBars::new(self.instrument.clone(), bars)
    }
}

/// Fetch daily bars for every universe member and resample them.
///
/// A member whose fetch fails is logged and skipped; members without bars
/// in range are dropped silently.
pub fn load_universe_bars(
    port: &dyn DataPort,
    universe: &Universe,
    start: NaiveDate,
    end: NaiveDate,
    resolution: Resolution,
) -> Vec<InstrumentBars> {
    let mut loaded = Vec::with_capacity(universe.count());
    for instrument in &universe.members {
        let daily = match port.fetch_bars(&instrument.symbol, start, end) {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(symbol = %instrument.symbol, error = %e, "skipping member");
                continue;
            }
        };
        if daily.is_empty() {
            tracing::debug!(symbol = %instrument.symbol, "no bars in range");
            continue;
        }
        loaded.push(InstrumentBars::new(
            instrument.clone(),
            aggregate(&daily, resolution),
        ));
    }
    tracing::debug!(
        universe = %universe.spec,
        members = universe.count(),
        loaded = loaded.len(),
        %start,
        %end,
        "loaded universe bars"
    );
    loaded
}

/// Fetch one instrument's daily bars, failing on an unknown symbol.
pub fn load_instrument_bars(
    port: &dyn DataPort,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    resolution: Resolution,
) -> Result<InstrumentBars, MarketLensError> {
    let instrument = port
        .find_instrument(symbol)?
        .ok_or_else(|| MarketLensError::UnknownSymbol {
            symbol: symbol.to_string(),
        })?;
    let daily = port.fetch_bars(&instrument.symbol, start, end)?;
    Ok(InstrumentBars::new(instrument, aggregate(&daily, resolution)))
}

/// Latest bar date on or before `requested_end` across the set.
pub fn effective_end_date(
    sets: &[InstrumentBars],
    requested_end: NaiveDate,
) -> Option<NaiveDate> {
    sets.iter()
        .flat_map(|s| s.bars.iter().rev().map(|b| b.date).find(|d| *d <= requested_end))
        .max()
}
