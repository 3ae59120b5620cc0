//! Instrument universes and snapshot-based index membership.
//!
//! Membership is a set of dated full rosters per index. The roster in force
//! on a date is the one attached to the latest as-of date on or before it;
//! there are no validity intervals.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::MarketLensError;
use crate::domain::instrument::{canonical_index, Instrument, InstrumentKind};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub symbol: String,
    pub name: Option<String>,
    pub date_first_added: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipSnapshot {
    pub index: String,
    pub as_of: NaiveDate,
    pub members: Vec<Member>,
}

/// All snapshots of one index, ordered by as-of date.
#[derive(Debug, Clone, Default)]
pub struct MembershipHistory {
    snapshots: BTreeMap<NaiveDate, Vec<Member>>,
}

impl MembershipHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster for `as_of` as a whole. A member's
    /// `date_first_added` is carried from the earliest snapshot it appears
    /// in when the incoming row doesn't provide one.
    pub fn replace_snapshot(&mut self, as_of: NaiveDate, mut members: Vec<Member>) {
        for member in &mut members {
            let earliest = self.first_added(&member.symbol);
            member.date_first_added = match (member.date_first_added, earliest) {
                (Some(given), Some(seen)) => Some(given.min(seen)),
                (given, seen) => given.or(seen),
            };
        }
        members.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        members.dedup_by(|a, b| a.symbol == b.symbol);
        self.snapshots.insert(as_of, members);
    }

    fn first_added(&self, symbol: &str) -> Option<NaiveDate> {
        self.snapshots
            .iter()
            .filter_map(|(as_of, members)| {
                members
                    .iter()
                    .find(|m| m.symbol == symbol)
                    .map(|m| m.date_first_added.unwrap_or(*as_of))
            })
            .min()
    }

    /// Roster in force on `date`.
    pub fn as_of(&self, index: &str, date: NaiveDate) -> Option<MembershipSnapshot> {
        self.snapshots
            .range(..=date)
            .next_back()
            .map(|(as_of, members)| MembershipSnapshot {
                index: index.to_string(),
                as_of: *as_of,
                members: members.clone(),
            })
    }

    pub fn as_of_dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.snapshots.keys()
    }
}

/// Which instruments a scan covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniverseSpec {
    AllStocks,
    Index(String),
}

impl UniverseSpec {
    pub fn label(&self) -> &str {
        match self {
            UniverseSpec::AllStocks => "ALL",
            UniverseSpec::Index(symbol) => symbol,
        }
    }
}

impl fmt::Display for UniverseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for UniverseSpec {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("ALL") {
            Ok(UniverseSpec::AllStocks)
        } else {
            Ok(UniverseSpec::Index(canonical_index(trimmed)))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Universe {
    pub spec: UniverseSpec,
    /// As-of date of the snapshot used, `None` for "ALL".
    pub snapshot_date: Option<NaiveDate>,
    pub members: Vec<Instrument>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Fail with `UnknownSymbol` unless `index` is a registered index.
pub fn require_index(port: &dyn DataPort, index: &str) -> Result<Instrument, MarketLensError> {
    match port.find_instrument(index)? {
        Some(instrument) if instrument.kind == InstrumentKind::Index => Ok(instrument),
        _ => Err(MarketLensError::UnknownSymbol {
            symbol: index.to_string(),
        }),
    }
}

/// Resolve a universe for a query dated `as_of`. An unknown index is an
/// error; a known index without a snapshot yields an empty universe.
pub fn resolve_universe(
    port: &dyn DataPort,
    spec: &UniverseSpec,
    as_of: NaiveDate,
) -> Result<Universe, MarketLensError> {
    match spec {
        UniverseSpec::AllStocks => {
            let members = port.list_instruments(InstrumentKind::Stock)?;
            tracing::debug!(count = members.len(), "resolved ALL stocks universe");
            Ok(Universe {
                spec: spec.clone(),
                snapshot_date: None,
                members,
            })
        }
        UniverseSpec::Index(index) => {
            require_index(port, index)?;
            let Some(snapshot) = port.latest_membership_as_of(index, as_of)? else {
                tracing::info!(%index, %as_of, "no membership snapshot on or before date");
                return Ok(Universe {
                    spec: spec.clone(),
                    snapshot_date: None,
                    members: Vec::new(),
                });
            };

            let known: HashMap<String, Instrument> = port
                .list_instruments(InstrumentKind::Stock)?
                .into_iter()
                .map(|i| (i.symbol.clone(), i))
                .collect();

            let members = snapshot
                .members
                .into_iter()
                .map(|m| {
                    known.get(&m.symbol).cloned().unwrap_or(Instrument {
                        symbol: m.symbol,
                        name: m.name,
                        kind: InstrumentKind::Stock,
                    })
                })
                .collect::<Vec<_>>();

            tracing::debug!(
                %index,
                snapshot = %snapshot.as_of,
                count = members.len(),
                "resolved index universe"
            );
            Ok(Universe {
                spec: spec.clone(),
                snapshot_date: Some(snapshot.as_of),
                members,
            })
        }
    }
}
