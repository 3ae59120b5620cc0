//! SQLite store: daily bars, instruments, index membership snapshots, alert
//! rules and alert events.

use crate::domain::alert::{AlertEvent, AlertKindTag, AlertRule, AlertRuleKind, NewAlertEvent, NewAlertRule};
use crate::domain::bar::Bar;
use crate::domain::error::MarketLensError;
use crate::domain::instrument::{Instrument, InstrumentKind};
use crate::domain::query::Cross;
use crate::domain::universe::{Member, MembershipHistory, MembershipSnapshot};
use crate::ports::alert_port::AlertPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS instrument (
    symbol TEXT PRIMARY KEY,
    name TEXT,
    kind TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS bar (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    volume INTEGER,
    PRIMARY KEY (symbol, date)
);
CREATE INDEX IF NOT EXISTS idx_bar_date ON bar(date);
CREATE TABLE IF NOT EXISTS index_membership (
    index_symbol TEXT NOT NULL,
    as_of TEXT NOT NULL,
    symbol TEXT NOT NULL,
    name TEXT,
    date_first_added TEXT,
    PRIMARY KEY (index_symbol, as_of, symbol)
);
CREATE TABLE IF NOT EXISTS alert_rule (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    symbol TEXT NOT NULL,
    type TEXT NOT NULL,
    level REAL,
    period INTEGER,
    direction TEXT,
    multiple REAL,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_triggered_date TEXT,
    updated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_alert_rule_owner ON alert_rule(owner);
CREATE TABLE IF NOT EXISTS alert_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_id INTEGER NOT NULL REFERENCES alert_rule(id),
    bar_date TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (rule_id, bar_date)
);";

fn pool_err(e: r2d2::Error) -> MarketLensError {
    MarketLensError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> MarketLensError {
    MarketLensError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn date_str(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn timestamp_str(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err(
    col: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_date(row: &Row<'_>, col: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(col)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_err(col, e))
}

fn parse_opt_date(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let s: Option<String> = row.get(col)?;
    s.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_err(col, e)))
        .transpose()
}

fn parse_timestamp(row: &Row<'_>, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(col)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(col, e))
}

fn parse_token<T: std::str::FromStr<Err = MarketLensError>>(
    row: &Row<'_>,
    col: usize,
) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(col)?;
    s.map(|s| s.parse::<T>().map_err(|e| conversion_err(col, e)))
        .transpose()
}

fn collect<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, MarketLensError> {
    rows.map(|r| r.map_err(query_err)).collect()
}

const RULE_COLUMNS: &str =
    "id, owner, symbol, type, level, period, direction, multiple, enabled, last_triggered_date";

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRule> {
    let tag: Option<AlertKindTag> = parse_token(row, 3)?;
    let tag = tag.ok_or_else(|| {
        conversion_err(3, MarketLensError::invalid("alert rule without a type"))
    })?;
    let period: Option<i64> = row.get(5)?;
    Ok(AlertRule {
        id: row.get(0)?,
        owner: row.get(1)?,
        symbol: row.get(2)?,
        kind: AlertRuleKind::from_parts(
            tag,
            row.get(4)?,
            period.and_then(|p| u32::try_from(p).ok()),
            parse_token::<Cross>(row, 6)?,
            row.get(7)?,
        ),
        enabled: row.get(8)?,
        last_triggered_date: parse_opt_date(row, 9)?,
    })
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, MarketLensError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| MarketLensError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;
        tracing::debug!(path = %db_path, pool_size, "opened sqlite pool");

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    /// Single-connection in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self, MarketLensError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, MarketLensError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), MarketLensError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn upsert_instrument(&self, instrument: &Instrument) -> Result<(), MarketLensError> {
        self.conn()?
            .execute(
                "INSERT INTO instrument (symbol, name, kind) VALUES (?1, ?2, ?3)
                 ON CONFLICT(symbol) DO UPDATE SET name = excluded.name, kind = excluded.kind",
                params![instrument.symbol, instrument.name, instrument.kind.to_string()],
            )
            .map_err(query_err)?;
        Ok(())
    }

    /// Insert or overwrite daily bars for one symbol.
    pub fn insert_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize, MarketLensError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO bar (symbol, date, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(query_err)?;
            for bar in bars {
                stmt.execute(params![
                    symbol,
                    date_str(bar.date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }

    fn membership_history(conn: &Connection, index: &str) -> Result<MembershipHistory, MarketLensError> {
        let mut stmt = conn
            .prepare(
                "SELECT as_of, symbol, name, date_first_added FROM index_membership
                 WHERE index_symbol = ?1 ORDER BY as_of, symbol",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![index], |row| {
                Ok((
                    parse_date(row, 0)?,
                    Member {
                        symbol: row.get(1)?,
                        name: row.get(2)?,
                        date_first_added: parse_opt_date(row, 3)?,
                    },
                ))
            })
            .map_err(query_err)?;

        let mut grouped: BTreeMap<NaiveDate, Vec<Member>> = BTreeMap::new();
        for (as_of, member) in collect(rows)? {
            grouped.entry(as_of).or_default().push(member);
        }
        let mut history = MembershipHistory::new();
        for (as_of, members) in grouped {
            history.replace_snapshot(as_of, members);
        }
        Ok(history)
    }

    /// Replace the whole roster of `index` at `as_of`.
    pub fn replace_membership(
        &self,
        index: &str,
        as_of: NaiveDate,
        members: Vec<Member>,
    ) -> Result<usize, MarketLensError> {
        let mut conn = self.conn()?;
        let mut history = Self::membership_history(&conn, index)?;
        history.replace_snapshot(as_of, members);
        let roster = history
            .as_of(index, as_of)
            .map(|s| s.members)
            .unwrap_or_default();

        let tx = conn.transaction().map_err(query_err)?;
        tx.execute(
            "DELETE FROM index_membership WHERE index_symbol = ?1 AND as_of = ?2",
            params![index, date_str(as_of)],
        )
        .map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO index_membership (index_symbol, as_of, symbol, name, date_first_added)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(query_err)?;
            for m in &roster {
                stmt.execute(params![
                    index,
                    date_str(as_of),
                    m.symbol,
                    m.name,
                    m.date_first_added.map(date_str)
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        tracing::info!(%index, %as_of, members = roster.len(), "membership snapshot replaced");
        Ok(roster.len())
    }

    pub fn create_rule(&self, rule: &NewAlertRule) -> Result<i64, MarketLensError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alert_rule (owner, symbol, type, level, period, direction, multiple, enabled, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rule.owner,
                rule.symbol,
                rule.kind.tag().to_string(),
                rule.kind.level(),
                rule.kind.period(),
                rule.kind.direction().map(|d| d.to_string()),
                rule.kind.multiple(),
                rule.enabled,
                timestamp_str(Utc::now())
            ],
        )
        .map_err(query_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_rules(&self, owner: &str) -> Result<Vec<AlertRule>, MarketLensError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RULE_COLUMNS} FROM alert_rule WHERE owner = ?1 ORDER BY id"
            ))
            .map_err(query_err)?;
        let rows = stmt.query_map(params![owner], rule_from_row).map_err(query_err)?;
        collect(rows)
    }
}

impl DataPort for SqliteAdapter {
    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, MarketLensError> {
        self.conn()?
            .query_row(
                "SELECT symbol, name, kind FROM instrument WHERE symbol = ?1",
                params![symbol],
                |row| {
                    let kind: Option<InstrumentKind> = parse_token(row, 2)?;
                    Ok(Instrument {
                        symbol: row.get(0)?,
                        name: row.get(1)?,
                        kind: kind.unwrap_or(InstrumentKind::Stock),
                    })
                },
            )
            .optional()
            .map_err(query_err)
    }

    fn list_instruments(&self, kind: InstrumentKind) -> Result<Vec<Instrument>, MarketLensError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol, name FROM instrument WHERE kind = ?1 ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![kind.to_string()], |row| {
                Ok(Instrument {
                    symbol: row.get(0)?,
                    name: row.get(1)?,
                    kind,
                })
            })
            .map_err(query_err)?;
        collect(rows)
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, MarketLensError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close, volume
                 FROM bar
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![symbol, date_str(start), date_str(end)], |row| {
                Ok(Bar {
                    date: parse_date(row, 0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(query_err)?;
        collect(rows)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MarketLensError> {
        let (min, max, count): (Option<String>, Option<String>, i64) = self
            .conn()?
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM bar WHERE symbol = ?1",
                params![symbol],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => {
                let parse = |s: &str| {
                    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| {
                        MarketLensError::DatabaseQuery {
                            reason: format!("bad stored date '{s}': {e}"),
                        }
                    })
                };
                Ok(Some((parse(&min)?, parse(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }

    fn latest_membership_as_of(
        &self,
        index: &str,
        as_of: NaiveDate,
    ) -> Result<Option<MembershipSnapshot>, MarketLensError> {
        let conn = self.conn()?;
        let snapshot_date: Option<String> = conn
            .query_row(
                "SELECT MAX(as_of) FROM index_membership WHERE index_symbol = ?1 AND as_of <= ?2",
                params![index, date_str(as_of)],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        let Some(snapshot_date) = snapshot_date else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT symbol, name, date_first_added FROM index_membership
                 WHERE index_symbol = ?1 AND as_of = ?2 ORDER BY symbol",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![index, snapshot_date], |row| {
                Ok(Member {
                    symbol: row.get(0)?,
                    name: row.get(1)?,
                    date_first_added: parse_opt_date(row, 2)?,
                })
            })
            .map_err(query_err)?;
        let members = collect(rows)?;

        let as_of = NaiveDate::parse_from_str(&snapshot_date, DATE_FORMAT).map_err(|e| {
            MarketLensError::DatabaseQuery {
                reason: e.to_string(),
            }
        })?;
        Ok(Some(MembershipSnapshot {
            index: index.to_string(),
            as_of,
            members,
        }))
    }
}

impl AlertPort for SqliteAdapter {
    fn enabled_rules(&self, owner: &str) -> Result<Vec<AlertRule>, MarketLensError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RULE_COLUMNS} FROM alert_rule WHERE owner = ?1 AND enabled = 1 ORDER BY id"
            ))
            .map_err(query_err)?;
        let rows = stmt.query_map(params![owner], rule_from_row).map_err(query_err)?;
        collect(rows)
    }

    fn insert_event(&self, event: &NewAlertEvent) -> Result<bool, MarketLensError> {
        let inserted = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO alert_event (rule_id, bar_date, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.rule_id,
                    date_str(event.bar_date),
                    event.message,
                    timestamp_str(event.created_at)
                ],
            )
            .map_err(query_err)?;
        Ok(inserted == 1)
    }

    fn mark_triggered(&self, rule_id: i64, bar_date: NaiveDate) -> Result<(), MarketLensError> {
        self.conn()?
            .execute(
                "UPDATE alert_rule SET last_triggered_date = ?1, updated_at = ?2 WHERE id = ?3",
                params![date_str(bar_date), timestamp_str(Utc::now()), rule_id],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn latest_events(&self, owner: &str, limit: usize) -> Result<Vec<AlertEvent>, MarketLensError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.rule_id, r.symbol, e.bar_date, e.message, e.created_at
                 FROM alert_event e JOIN alert_rule r ON r.id = e.rule_id
                 WHERE r.owner = ?1
                 ORDER BY e.created_at DESC, e.id DESC
                 LIMIT ?2",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![owner, limit as i64], |row| {
                Ok(AlertEvent {
                    id: row.get(0)?,
                    rule_id: row.get(1)?,
                    symbol: row.get(2)?,
                    bar_date: parse_date(row, 3)?,
                    message: row.get(4)?,
                    created_at: parse_timestamp(row, 5)?,
                })
            })
            .map_err(query_err)?;
        collect(rows)
    }
}
