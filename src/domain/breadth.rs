//! Market breadth: how many universe members satisfy each condition at the
//! effective as-of date, plus the member list behind any one condition.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::str::FromStr;

use crate::domain::error::MarketLensError;
use crate::domain::instrument_bars::{effective_end_date, load_universe_bars, InstrumentBars};
use crate::domain::numeric::round6;
use crate::domain::query::Resolution;
use crate::domain::screener::ScreenerItem;
use crate::domain::snapshot::MemberSnapshot;
use crate::domain::universe::{resolve_universe, UniverseSpec};
use crate::ports::data_port::DataPort;

/// Calendar days fetched before the as-of date to fill 252-bar windows.
pub const BREADTH_BUFFER_DAYS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadthCondition {
    Up,
    Down,
    Flat,
    AboveMa20,
    AboveMa50,
    AboveMa200,
    NewHigh,
    NewLow,
    VolumeSurge,
}

impl BreadthCondition {
    pub fn holds(self, snap: &MemberSnapshot, volume_multiple: f64) -> bool {
        match self {
            BreadthCondition::Up => snap.is_up(),
            BreadthCondition::Down => snap.is_down(),
            BreadthCondition::Flat => snap.is_unchanged(),
            BreadthCondition::AboveMa20 => snap.above_ma20(),
            BreadthCondition::AboveMa50 => snap.above_ma50(),
            BreadthCondition::AboveMa200 => snap.above_ma200(),
            BreadthCondition::NewHigh => snap.at_high252(),
            BreadthCondition::NewLow => snap.at_low252(),
            BreadthCondition::VolumeSurge => snap.volume_surge(volume_multiple),
        }
    }
}

impl FromStr for BreadthCondition {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "advancing" => Ok(BreadthCondition::Up),
            "down" | "declining" => Ok(BreadthCondition::Down),
            "flat" | "unchanged" => Ok(BreadthCondition::Flat),
            "above_ma20" => Ok(BreadthCondition::AboveMa20),
            "above_ma50" => Ok(BreadthCondition::AboveMa50),
            "above_ma200" => Ok(BreadthCondition::AboveMa200),
            "new_high" | "new_high_52w" => Ok(BreadthCondition::NewHigh),
            "new_low" | "new_low_52w" => Ok(BreadthCondition::NewLow),
            "volume_surge" => Ok(BreadthCondition::VolumeSurge),
            _ => Err(MarketLensError::invalid(
                "metric must be one of: up, down, flat, above_ma20, above_ma50, above_ma200, new_high, new_low, volume_surge",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BreadthSnapshot {
    pub universe: String,
    pub as_of_date: Option<NaiveDate>,
    pub total_members: usize,
    pub members_with_data: usize,
    pub up: usize,
    pub down: usize,
    pub flat: usize,
    pub above_ma20: usize,
    pub above_ma50: usize,
    pub above_ma200: usize,
    pub pct_above_ma20: Option<f64>,
    pub pct_above_ma50: Option<f64>,
    pub pct_above_ma200: Option<f64>,
    pub new_high_52w: usize,
    pub new_low_52w: usize,
    pub volume_surge: usize,
    pub volume_multiple: f64,
}

fn pct(count: usize, of: usize) -> Option<f64> {
    (of > 0).then(|| count as f64 / of as f64 * 100.0).and_then(round6)
}

/// Count conditions over loaded daily bars at `as_of`.
pub fn compute_breadth(
    sets: &[InstrumentBars],
    total_members: usize,
    as_of: NaiveDate,
    volume_multiple: f64,
) -> BreadthSnapshot {
    let snaps: Vec<MemberSnapshot> = sets
        .iter()
        .filter_map(|set| MemberSnapshot::at(set, as_of, None))
        .collect();
    let count = |c: BreadthCondition| snaps.iter().filter(|s| c.holds(s, volume_multiple)).count();

    let with_data = snaps.len();
    let above_ma20 = count(BreadthCondition::AboveMa20);
    let above_ma50 = count(BreadthCondition::AboveMa50);
    let above_ma200 = count(BreadthCondition::AboveMa200);

    BreadthSnapshot {
        universe: String::new(),
        as_of_date: Some(as_of),
        total_members,
        members_with_data: with_data,
        up: count(BreadthCondition::Up),
        down: count(BreadthCondition::Down),
        flat: count(BreadthCondition::Flat),
        above_ma20,
        above_ma50,
        above_ma200,
        pct_above_ma20: pct(above_ma20, with_data),
        pct_above_ma50: pct(above_ma50, with_data),
        pct_above_ma200: pct(above_ma200, with_data),
        new_high_52w: count(BreadthCondition::NewHigh),
        new_low_52w: count(BreadthCondition::NewLow),
        volume_surge: count(BreadthCondition::VolumeSurge),
        volume_multiple,
    }
}

/// Members satisfying `condition` at `as_of`, ordered by symbol.
pub fn breadth_members(
    sets: &[InstrumentBars],
    condition: BreadthCondition,
    as_of: NaiveDate,
    volume_multiple: f64,
) -> Vec<ScreenerItem> {
    let mut items: Vec<ScreenerItem> = sets
        .iter()
        .filter_map(|set| {
            let snap = MemberSnapshot::at(set, as_of, None)?;
            condition
                .holds(&snap, volume_multiple)
                .then(|| ScreenerItem::from_snapshot(set, &snap))
        })
        .collect();
    items.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    items
}

fn load(
    port: &dyn DataPort,
    universe: &UniverseSpec,
    as_of: NaiveDate,
) -> Result<(usize, Vec<InstrumentBars>), MarketLensError> {
    let resolved = resolve_universe(port, universe, as_of)?;
    let start = as_of
        .checked_sub_days(Days::new(BREADTH_BUFFER_DAYS))
        .unwrap_or(NaiveDate::MIN);
    let sets = load_universe_bars(port, &resolved, start, as_of, Resolution::Daily);
    Ok((resolved.count(), sets))
}

pub fn breadth_snapshot(
    port: &dyn DataPort,
    universe: &UniverseSpec,
    as_of: NaiveDate,
    volume_multiple: f64,
) -> Result<BreadthSnapshot, MarketLensError> {
    let (total, sets) = load(port, universe, as_of)?;
    let Some(as_of_bar) = effective_end_date(&sets, as_of) else {
        return Ok(BreadthSnapshot {
            universe: universe.to_string(),
            total_members: total,
            volume_multiple,
            ..Default::default()
        });
    };
    let mut snapshot = compute_breadth(&sets, total, as_of_bar, volume_multiple);
    snapshot.universe = universe.to_string();
    tracing::info!(
        universe = %universe,
        %as_of_bar,
        members = total,
        with_data = snapshot.members_with_data,
        "breadth snapshot"
    );
    Ok(snapshot)
}

#[derive(Debug, Clone, Serialize)]
pub struct BreadthDetail {
    pub universe: String,
    pub condition: BreadthCondition,
    pub as_of_date: Option<NaiveDate>,
    pub items: Vec<ScreenerItem>,
}

pub fn breadth_detail(
    port: &dyn DataPort,
    universe: &UniverseSpec,
    condition: BreadthCondition,
    as_of: NaiveDate,
    volume_multiple: f64,
) -> Result<BreadthDetail, MarketLensError> {
    let (_, sets) = load(port, universe, as_of)?;
    let as_of_bar = effective_end_date(&sets, as_of);
    let items = as_of_bar
        .map(|d| breadth_members(&sets, condition, d, volume_multiple))
        .unwrap_or_default();
    Ok(BreadthDetail {
        universe: universe.to_string(),
        condition,
        as_of_date: as_of_bar,
        items,
    })
}
