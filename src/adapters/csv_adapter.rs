//! CSV directory data adapter.
//!
//! Layout under the base directory:
//! - `instruments.csv`: `symbol,name,kind`
//! - `bars/<SYMBOL>.csv`: `date,open,high,low,close,volume` (empty field = missing)
//! - `membership.csv`: `index,as_of,symbol,name,date_first_added` (optional)

use crate::domain::bar::Bar;
use crate::domain::error::MarketLensError;
use crate::domain::instrument::{canonical_index, canonical_symbol, Instrument, InstrumentKind};
use crate::domain::universe::{Member, MembershipHistory, MembershipSnapshot};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    symbol: String,
    name: Option<String>,
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembershipRow {
    index: String,
    as_of: NaiveDate,
    symbol: String,
    name: Option<String>,
    date_first_added: Option<NaiveDate>,
}

fn read_err(path: &Path, e: impl std::fmt::Display) -> MarketLensError {
    MarketLensError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    }
}

pub struct CsvAdapter {
    base_path: PathBuf,
    instruments: BTreeMap<String, Instrument>,
    membership: HashMap<String, MembershipHistory>,
}

impl CsvAdapter {
    pub fn open<P: Into<PathBuf>>(base_path: P) -> Result<Self, MarketLensError> {
        let base_path = base_path.into();
        let instruments = Self::load_instruments(&base_path.join("instruments.csv"))?;
        let membership = Self::load_membership(&base_path.join("membership.csv"))?;
        tracing::debug!(
            path = %base_path.display(),
            instruments = instruments.len(),
            indexes = membership.len(),
            "opened csv store"
        );
        Ok(Self {
            base_path,
            instruments,
            membership,
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, MarketLensError> {
        let path = config
            .get_string("csv", "path")
            .ok_or_else(|| MarketLensError::ConfigMissing {
                section: "csv".into(),
                key: "path".into(),
            })?;
        Self::open(path)
    }

    fn load_instruments(path: &Path) -> Result<BTreeMap<String, Instrument>, MarketLensError> {
        let mut rdr = csv::Reader::from_path(path).map_err(|e| read_err(path, e))?;
        let mut out = BTreeMap::new();
        for row in rdr.deserialize::<InstrumentRow>() {
            let row = row.map_err(|e| read_err(path, e))?;
            let kind = match row.kind.as_deref() {
                Some(k) if !k.trim().is_empty() => k.parse()?,
                _ if row.symbol.trim().starts_with('^') => InstrumentKind::Index,
                _ => InstrumentKind::Stock,
            };
            let instrument = match kind {
                InstrumentKind::Stock => Instrument::stock(&row.symbol, row.name.as_deref()),
                InstrumentKind::Index => Instrument::index(&row.symbol, row.name.as_deref()),
            };
            out.insert(instrument.symbol.clone(), instrument);
        }
        Ok(out)
    }

    fn load_membership(path: &Path) -> Result<HashMap<String, MembershipHistory>, MarketLensError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let mut rdr = csv::Reader::from_path(path).map_err(|e| read_err(path, e))?;
        let mut grouped: BTreeMap<(String, NaiveDate), Vec<Member>> = BTreeMap::new();
        for row in rdr.deserialize::<MembershipRow>() {
            let row = row.map_err(|e| read_err(path, e))?;
            grouped
                .entry((canonical_index(&row.index), row.as_of))
                .or_default()
                .push(Member {
                    symbol: canonical_symbol(&row.symbol),
                    name: row.name,
                    date_first_added: row.date_first_added,
                });
        }

        // BTreeMap order replays snapshots oldest first per index
        let mut histories: HashMap<String, MembershipHistory> = HashMap::new();
        for ((index, as_of), members) in grouped {
            histories.entry(index).or_default().replace_snapshot(as_of, members);
        }
        Ok(histories)
    }

    fn bars_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join("bars").join(format!("{symbol}.csv"))
    }

    /// Every bar on file for `symbol`, ascending. A missing file is no data.
    pub fn all_bars(&self, symbol: &str) -> Result<Vec<Bar>, MarketLensError> {
        let path = self.bars_path(symbol);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| read_err(&path, e))?;
        let mut bars = rdr
            .deserialize::<Bar>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err(&path, e))?;
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Ok(bars)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    /// `(index, snapshot)` pairs, oldest snapshot first within each index.
    pub fn membership_snapshots(&self) -> Vec<MembershipSnapshot> {
        let mut out = Vec::new();
        for (index, history) in &self.membership {
            out.extend(history.as_of_dates().filter_map(|d| history.as_of(index, *d)));
        }
        out.sort_by(|a, b| a.index.cmp(&b.index).then(a.as_of.cmp(&b.as_of)));
        out
    }
}

impl DataPort for CsvAdapter {
    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, MarketLensError> {
        Ok(self.instruments.get(symbol).cloned())
    }

    fn list_instruments(&self, kind: InstrumentKind) -> Result<Vec<Instrument>, MarketLensError> {
        Ok(self
            .instruments
            .values()
            .filter(|i| i.kind == kind)
            .cloned()
            .collect())
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, MarketLensError> {
        let mut bars = self.all_bars(symbol)?;
        bars.retain(|b| b.date >= start && b.date <= end);
        Ok(bars)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MarketLensError> {
        let bars = self.all_bars(symbol)?;
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((first.date, last.date, bars.len()))),
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
            .and_then(|history| history.as_of(index, as_of)))
    }
}
