//! End-to-end pipelines over an in-memory data port and, with the `sqlite`
//! feature, over a seeded in-memory SQLite store.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use marketlens::domain::alert::{evaluate_alerts, AlertRule, AlertRuleKind};
use marketlens::domain::analysis::{analyze, AnalysisRequest, Params, StrategyRegistry};
use marketlens::domain::breadth::{breadth_detail, breadth_snapshot, BreadthCondition};
use marketlens::domain::error::MarketLensError;
use marketlens::domain::factor::{factor_ranking, FactorQuery};
use marketlens::domain::indicator::series::{bar_series, indicator_series, IndicatorRequest};
use marketlens::domain::indicator::IndicatorType;
use marketlens::domain::instrument::Instrument;
use marketlens::domain::query::{Cross, Direction, DrawdownMode, FactorMetric, Resolution, ScreenerPreset};
use marketlens::domain::relative_strength::{rs_ranking, rs_series, RsRankQuery};
use marketlens::domain::screener::{run_screener, ScreenerQuery};
use marketlens::domain::streak::{streak_ranking, symbol_streak, StreakFilters, StreakQuery};
use marketlens::domain::universe::UniverseSpec;

fn spx() -> UniverseSpec {
    UniverseSpec::Index("^SPX".to_string())
}

mod indicator_pipeline {
    use super::*;

    #[test]
    fn warmup_history_feeds_ema_but_is_not_returned() {
        let start = date(2020, 1, 1);
        let closes: Vec<f64> = (0..2000).map(|i| 100.0 + (i % 7) as f64).collect();
        let port = MockDataPort::new().with_bars("AAA", generate_bars(start, &closes));

        let request = IndicatorRequest {
            symbol: "AAA".into(),
            resolution: Resolution::Daily,
            start: date(2024, 1, 1),
            end: date(2024, 1, 31),
            ma_periods: vec![5, 20],
            include: vec![IndicatorType::MACD],
        };
        let series = indicator_series(&port, &request).unwrap();

        assert_eq!(series.points.len(), 31);
        assert_eq!(series.points[0].date, date(2024, 1, 1));
        let first = &series.points[0];
        let ma = first.ma.as_ref().unwrap();
        assert!(ma[&5].is_some());
        assert!(ma[&20].is_some());
        // warmed up: the signal line already exists on the first returned bar
        assert!(first.macd.unwrap().dea.is_some());
        assert!(first.kdj.is_none());
    }

    #[test]
    fn weekly_bars_are_dated_on_last_trading_day() {
        // 2024-01-01 is a Monday
        let port = MockDataPort::new().with_bars("AAA", ramp(date(2024, 1, 1), 10.0, 1.0, 10));
        let series = bar_series(&port, "AAA", Resolution::Weekly, date(2024, 1, 1), date(2024, 1, 10)).unwrap();
        assert_eq!(series.bars.len(), 2);
        assert_eq!(series.bars[0].date, date(2024, 1, 7));
        assert_eq!(series.bars[0].open, Some(10.0));
        assert_eq!(series.bars[0].close, Some(16.0));
        assert_eq!(series.bars[0].volume, Some(7000));
        assert_eq!(series.bars[1].date, date(2024, 1, 10));
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let port = MockDataPort::new();
        let err = bar_series(&port, "NOPE", Resolution::Daily, date(2024, 1, 1), date(2024, 2, 1)).unwrap_err();
        assert!(matches!(err, MarketLensError::UnknownSymbol { .. }));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let port = MockDataPort::new().with_bars("AAA", ramp(date(2024, 1, 1), 10.0, 1.0, 10));
        let err = bar_series(&port, "AAA", Resolution::Daily, date(2024, 2, 1), date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, MarketLensError::InvalidDateRange { .. }));
    }
}

mod streak_scan {
    use super::*;

    #[test]
    fn ranks_members_of_index_snapshot() {
        let d0 = date(2024, 1, 1);
        let port = MockDataPort::new()
            .with_bars("LONG", generate_bars(d0, &[1.0, 2.0, 3.0, 4.0, 5.0, 4.0]))
            .with_bars("SHORT", generate_bars(d0, &[1.0, 2.0, 1.0, 2.0, 3.0, 2.0]))
            .with_bars("OUTSIDE", generate_bars(d0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
            .with_membership("^SPX", date(2023, 12, 1), &["LONG", "SHORT"]);

        let query = StreakQuery {
            universe: spx(),
            resolution: Resolution::Daily,
            direction: Direction::Up,
            start: d0,
            end: date(2024, 1, 31),
            filters: StreakFilters::default(),
            limit: 20,
        };
        let items = streak_ranking(&port, &query).unwrap();
        let symbols: Vec<&str> = items.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["LONG", "SHORT"]);
        assert_eq!(items[0].streak, 4);
        assert_eq!(items[0].start_date, Some(date(2024, 1, 2)));
        assert_eq!(items[0].end_date, Some(date(2024, 1, 5)));
        assert_eq!(items[1].streak, 2);
    }

    #[test]
    fn all_stocks_skips_members_whose_fetch_fails() {
        let d0 = date(2024, 1, 1);
        let port = MockDataPort::new()
            .with_bars("AAA", generate_bars(d0, &[1.0, 2.0, 3.0]))
            .with_error("BAD", "disk on fire");
        let query = StreakQuery {
            universe: UniverseSpec::AllStocks,
            resolution: Resolution::Daily,
            direction: Direction::Up,
            start: d0,
            end: date(2024, 1, 31),
            filters: StreakFilters::default(),
            limit: 20,
        };
        let items = streak_ranking(&port, &query).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol, "AAA");
    }

    fn ndx_query() -> StreakQuery {
        StreakQuery {
            universe: UniverseSpec::Index("^NDX".into()),
            resolution: Resolution::Daily,
            direction: Direction::Up,
            start: date(2024, 1, 1),
            end: date(2024, 1, 31),
            filters: StreakFilters::default(),
            limit: 20,
        }
    }

    #[test]
    fn index_without_snapshot_is_an_empty_ranking() {
        let port = MockDataPort::new()
            .with_bars("AAA", ramp(date(2024, 1, 1), 1.0, 1.0, 5))
            .with_instrument(Instrument::index("^NDX", None));
        assert!(streak_ranking(&port, &ndx_query()).unwrap().is_empty());
    }

    #[test]
    fn unregistered_index_is_an_error() {
        let port = MockDataPort::new().with_bars("AAA", ramp(date(2024, 1, 1), 1.0, 1.0, 5));
        let err = streak_ranking(&port, &ndx_query()).unwrap_err();
        assert!(matches!(err, MarketLensError::UnknownSymbol { ref symbol } if symbol == "^NDX"));
    }

    #[test]
    fn stock_symbol_is_not_an_index() {
        let port = MockDataPort::new().with_instrument(Instrument::stock("^NDX", None));
        assert!(matches!(
            streak_ranking(&port, &ndx_query()),
            Err(MarketLensError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn single_symbol_without_run_reports_zero() {
        let d0 = date(2024, 1, 1);
        let port = MockDataPort::new().with_bars("DOWN", generate_bars(d0, &[5.0, 4.0, 3.0]));
        let item = symbol_streak(
            &port,
            "DOWN",
            Resolution::Daily,
            Direction::Up,
            d0,
            date(2024, 1, 31),
            StreakFilters::default(),
        )
        .unwrap();
        assert_eq!(item.streak, 0);
        assert_eq!(item.start_date, None);
        assert_eq!(item.end_date, None);
    }
}

mod factor_scan {
    use super::*;

    #[test]
    fn worst_drawdown_first_with_most_recent_date() {
        let d0 = date(2024, 1, 1);
        let port = MockDataPort::new()
            .with_bars("DEEP", generate_bars(d0, &[10.0, 12.0, 8.0, 11.0, 8.0]))
            .with_bars("MILD", generate_bars(d0, &[10.0, 9.0, 10.0]));
        let query = FactorQuery {
            universe: UniverseSpec::AllStocks,
            resolution: Resolution::Daily,
            metric: FactorMetric::MaxDrawdown,
            mode: DrawdownMode::Worst,
            start: d0,
            end: date(2024, 1, 31),
            lookback: 252,
            limit: 20,
        };
        let items = factor_ranking(&port, &query).unwrap();
        assert_eq!(items[0].symbol, "DEEP");
        assert_abs_diff_eq!(items[0].value.unwrap(), -1.0 / 3.0, epsilon = 1e-6);
        assert_eq!(items[0].date, Some(date(2024, 1, 5)));

        let best = factor_ranking(&port, &FactorQuery { mode: DrawdownMode::Best, ..query }).unwrap();
        assert_eq!(best[0].symbol, "MILD");
    }

    #[test]
    fn unknown_index_universe_fails_fast() {
        let port = MockDataPort::new().with_bars("DEEP", generate_bars(date(2024, 1, 1), &[10.0, 8.0]));
        let query = FactorQuery {
            universe: UniverseSpec::Index("^BOGUS".into()),
            resolution: Resolution::Daily,
            metric: FactorMetric::MaxDrawdown,
            mode: DrawdownMode::Worst,
            start: date(2024, 1, 1),
            end: date(2024, 1, 31),
            lookback: 252,
            limit: 20,
        };
        let err = factor_ranking(&port, &query).unwrap_err();
        assert!(matches!(err, MarketLensError::UnknownSymbol { ref symbol } if symbol == "^BOGUS"));
    }
}

mod breadth_and_screener {
    use super::*;

    fn port() -> MockDataPort {
        let d0 = date(2024, 1, 1);
        MockDataPort::new()
            .with_bars("UP", ramp(d0, 10.0, 1.0, 60))
            .with_bars("DOWN", ramp(d0, 100.0, -1.0, 60))
            .with_membership("^SPX", date(2023, 1, 1), &["UP", "DOWN", "GONE"])
    }

    #[test]
    fn breadth_counts_at_latest_common_bar() {
        // last bar is 2024-02-29; asking for a later date resolves back to it
        let snap = breadth_snapshot(&port(), &spx(), date(2024, 3, 10), 2.0).unwrap();
        assert_eq!(snap.as_of_date, Some(date(2024, 2, 29)));
        assert_eq!(snap.total_members, 3);
        assert_eq!(snap.members_with_data, 2);
        assert_eq!((snap.up, snap.down, snap.flat), (1, 1, 0));
        assert_eq!(snap.above_ma50, 1);
        assert_eq!(snap.pct_above_ma50, Some(50.0));
        assert_eq!(snap.new_high_52w, 1);
        assert_eq!(snap.new_low_52w, 1);
    }

    #[test]
    fn breadth_detail_lists_members() {
        let detail = breadth_detail(&port(), &spx(), BreadthCondition::Down, date(2024, 3, 10), 2.0).unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].symbol, "DOWN");
    }

    #[test]
    fn empty_universe_has_no_as_of_date() {
        let port = port().with_instrument(Instrument::index("^NDX", None));
        let snap = breadth_snapshot(&port, &UniverseSpec::Index("^NDX".into()), date(2024, 3, 10), 2.0).unwrap();
        assert_eq!(snap.as_of_date, None);
        assert_eq!(snap.members_with_data, 0);
    }

    #[test]
    fn breadth_of_unknown_index_is_an_error() {
        let err = breadth_snapshot(&port(), &UniverseSpec::Index("^NDX".into()), date(2024, 3, 10), 2.0).unwrap_err();
        assert!(matches!(err, MarketLensError::UnknownSymbol { .. }));
    }

    #[test]
    fn breakout_screener_finds_new_highs() {
        let query = ScreenerQuery {
            universe: spx(),
            preset: ScreenerPreset::Breakout,
            as_of: date(2024, 3, 10),
            lookback: 20,
            limit: 20,
        };
        let result = run_screener(&port(), &query).unwrap();
        assert_eq!(result.as_of_date, Some(date(2024, 2, 29)));
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].symbol, "UP");
        // 69 / 49 - 1
        assert_abs_diff_eq!(result.items[0].return_pct.unwrap(), 69.0 / 49.0 - 1.0, epsilon = 1e-6);
    }
}

mod relative_strength_scan {
    use super::*;

    #[test]
    fn series_and_rank_against_index() {
        let d0 = date(2024, 1, 1);
        let port = MockDataPort::new()
            .with_bars("^SPX", ramp(d0, 100.0, 1.0, 30))
            .with_bars("FAST", ramp(d0, 10.0, 1.0, 30))
            .with_bars("SLOW", ramp(d0, 100.0, 0.1, 30))
            .with_membership("^SPX", date(2023, 1, 1), &["FAST", "SLOW"]);

        let series = rs_series(&port, "FAST", "SP500", d0, date(2024, 1, 30)).unwrap();
        assert_eq!(series.index, "^SPX");
        assert_eq!(series.points[0].rs_norm, Some(1.0));
        assert_abs_diff_eq!(series.stock_return.unwrap(), 29.0 / 10.0, epsilon = 1e-6);

        let ranking = rs_ranking(
            &port,
            &RsRankQuery {
                universe: spx(),
                index: "^SPX".into(),
                as_of: date(2024, 2, 15),
                lookback: 10,
                require_above_ma50: false,
                limit: 20,
            },
        )
        .unwrap();
        assert_eq!(ranking.as_of_date, Some(date(2024, 1, 30)));
        assert_eq!(ranking.items[0].symbol, "FAST");
        assert_eq!(ranking.items.len(), 2);
    }

    #[test]
    fn ranking_against_unknown_index_is_an_error() {
        let port = MockDataPort::new().with_bars("FAST", ramp(date(2024, 1, 1), 10.0, 1.0, 30));
        let err = rs_ranking(
            &port,
            &RsRankQuery {
                universe: UniverseSpec::AllStocks,
                index: "BOGUS".into(),
                as_of: date(2024, 2, 15),
                lookback: 10,
                require_above_ma50: false,
                limit: 20,
            },
        )
        .unwrap_err();
        assert!(matches!(err, MarketLensError::UnknownSymbol { ref symbol } if symbol == "^BOGUS"));
    }
}

mod analysis_registry {
    use super::*;

    #[test]
    fn trend_over_index_universe() {
        let d0 = date(2024, 1, 1);
        let port = MockDataPort::new()
            .with_bars("UP", ramp(d0, 10.0, 1.0, 30))
            .with_bars("FLATISH", ramp(d0, 10.0, 0.01, 30))
            .with_membership("^SPX", date(2023, 1, 1), &["UP", "FLATISH"]);
        let request = AnalysisRequest {
            kind: "trend".into(),
            universe: spx(),
            start: d0,
            end: date(2024, 1, 30),
            limit: None,
            params: Params::new(),
        };
        let response = analyze(&port, &StrategyRegistry::standard(), &request).unwrap();
        assert_eq!(response.kind, "TREND");
        assert_eq!(response.results[0].symbol, "UP");
        assert!(response.results[0].details.contains_key("rSquared"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let request = AnalysisRequest {
            kind: "VOLATILITY".into(),
            universe: UniverseSpec::AllStocks,
            start: date(2024, 1, 1),
            end: date(2024, 2, 1),
            limit: None,
            params: Params::new(),
        };
        let err = analyze(&MockDataPort::new(), &StrategyRegistry::standard(), &request).unwrap_err();
        assert!(matches!(err, MarketLensError::InvalidArgument { .. }));
    }
}

mod alert_evaluation {
    use super::*;

    fn rule(id: i64, kind: AlertRuleKind) -> AlertRule {
        AlertRule {
            id,
            owner: "alice".into(),
            symbol: "AAA".into(),
            kind,
            enabled: true,
            last_triggered_date: None,
        }
    }

    fn breakout_port() -> MockDataPort {
        // last bar crosses 100 from below
        MockDataPort::new().with_bars("AAA", generate_bars(date(2024, 3, 1), &[95.0, 98.0, 99.0, 101.0]))
    }

    #[test]
    fn evaluation_is_idempotent_per_bar_date() {
        let port = breakout_port();
        let alerts = MockAlertPort::new(vec![rule(
            1,
            AlertRuleKind::PriceBreakout {
                level: Some(100.0),
                direction: Some(Cross::Above),
            },
        )]);

        let first = evaluate_alerts(&port, &alerts, "alice", 50, fixed_now()).unwrap();
        assert_eq!(first.triggered_count, 1);
        assert_eq!(first.latest_events.len(), 1);
        assert_eq!(first.latest_events[0].bar_date, date(2024, 3, 4));
        assert!(first.latest_events[0].message.starts_with("AAA "));
        assert_eq!(alerts.rule(1).last_triggered_date, Some(date(2024, 3, 4)));

        let second = evaluate_alerts(&port, &alerts, "alice", 50, fixed_now()).unwrap();
        assert_eq!(second.triggered_count, 0);
        assert_eq!(second.latest_events.len(), 1);
        // the already-triggered rule is skipped before any insert
        assert_eq!(*alerts.insert_calls.borrow(), 1);
    }

    #[test]
    fn duplicate_insert_does_not_advance_rule() {
        let port = breakout_port();
        let alerts = MockAlertPort::new(vec![rule(
            1,
            AlertRuleKind::PriceBreakout {
                level: Some(100.0),
                direction: Some(Cross::Above),
            },
        )]);
        // an event for this bar already exists but the rule was never marked
        evaluate_alerts(&port, &alerts, "alice", 50, fixed_now()).unwrap();
        alerts.rules.borrow_mut()[0].last_triggered_date = None;

        let again = evaluate_alerts(&port, &alerts, "alice", 50, fixed_now()).unwrap();
        assert_eq!(again.triggered_count, 0);
        assert_eq!(alerts.events.borrow().len(), 1);
        assert_eq!(alerts.rule(1).last_triggered_date, None);
    }

    #[test]
    fn rules_without_data_or_parameters_are_skipped() {
        let port = breakout_port();
        let mut no_data = rule(1, AlertRuleKind::VolumeSurge { multiple: Some(1.0) });
        no_data.symbol = "ZZZ".into();
        let incomplete = rule(2, AlertRuleKind::MaCross { period: Some(20), direction: None });
        let mut disabled = rule(3, AlertRuleKind::VolumeSurge { multiple: Some(1.0) });
        disabled.enabled = false;
        let alerts = MockAlertPort::new(vec![no_data, incomplete, disabled]);

        let result = evaluate_alerts(&port, &alerts, "alice", 50, fixed_now()).unwrap();
        assert_eq!(result.triggered_count, 0);
        assert!(result.latest_events.is_empty());
    }

    #[test]
    fn volume_surge_fires_once() {
        let mut bars = generate_bars(date(2024, 3, 1), &[10.0; 10]);
        bars.last_mut().unwrap().volume = Some(10_000);
        let port = MockDataPort::new().with_bars("AAA", bars);
        let alerts = MockAlertPort::new(vec![rule(7, AlertRuleKind::VolumeSurge { multiple: Some(3.0) })]);

        let result = evaluate_alerts(&port, &alerts, "alice", 50, fixed_now()).unwrap();
        assert_eq!(result.triggered_count, 1);
        assert_eq!(result.latest_events[0].rule_id, 7);
    }

    #[test]
    fn latest_events_are_limited() {
        let port = breakout_port();
        let alerts = MockAlertPort::new(vec![
            rule(1, AlertRuleKind::PriceBreakout { level: Some(100.0), direction: Some(Cross::Above) }),
            rule(2, AlertRuleKind::PriceBreakout { level: Some(100.5), direction: Some(Cross::Above) }),
        ]);
        let result = evaluate_alerts(&port, &alerts, "alice", 1, fixed_now()).unwrap();
        assert_eq!(result.triggered_count, 2);
        assert_eq!(result.latest_events.len(), 1);
        assert_eq!(result.latest_events[0].rule_id, 2);
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_adapter_tests {
    use super::*;
    use marketlens::adapters::sqlite_adapter::SqliteAdapter;
    use marketlens::domain::alert::NewAlertRule;
    use marketlens::domain::universe::Member;
    use marketlens::ports::alert_port::AlertPort;

    fn seeded() -> SqliteAdapter {
        let store = SqliteAdapter::in_memory().unwrap();
        let d0 = date(2024, 1, 1);
        store.upsert_instrument(&Instrument::stock("AAA", Some("Alpha"))).unwrap();
        store.upsert_instrument(&Instrument::stock("BBB", None)).unwrap();
        store.upsert_instrument(&Instrument::index("^SPX", None)).unwrap();
        store.insert_bars("AAA", &generate_bars(d0, &[1.0, 2.0, 3.0, 4.0])).unwrap();
        store.insert_bars("BBB", &generate_bars(d0, &[4.0, 3.0, 4.0, 5.0])).unwrap();
        store
            .replace_membership(
                "^SPX",
                date(2023, 6, 1),
                ["AAA", "BBB"]
                    .iter()
                    .map(|s| Member {
                        symbol: s.to_string(),
                        name: None,
                        date_first_added: None,
                    })
                    .collect(),
            )
            .unwrap();
        store
    }

    #[test]
    fn streak_ranking_via_sqlite() {
        let store = seeded();
        let query = StreakQuery {
            universe: spx(),
            resolution: Resolution::Daily,
            direction: Direction::Up,
            start: date(2024, 1, 1),
            end: date(2024, 1, 31),
            filters: StreakFilters::default(),
            limit: 20,
        };
        let items = streak_ranking(&store, &query).unwrap();
        assert_eq!(items[0].symbol, "AAA");
        assert_eq!(items[0].name.as_deref(), Some("Alpha"));
        assert_eq!(items[0].streak, 3);
        assert_eq!(items[1].streak, 2);
    }

    #[test]
    fn alert_evaluation_via_sqlite_is_idempotent() {
        let store = seeded();
        let id = store
            .create_rule(&NewAlertRule {
                owner: "alice".into(),
                symbol: "AAA".into(),
                kind: AlertRuleKind::PriceBreakout {
                    level: Some(3.5),
                    direction: Some(Cross::Above),
                },
                enabled: true,
            })
            .unwrap();

        let first = evaluate_alerts(&store, &store, "alice", 50, fixed_now()).unwrap();
        assert_eq!(first.triggered_count, 1);
        assert_eq!(first.latest_events[0].rule_id, id);

        let second = evaluate_alerts(&store, &store, "alice", 50, fixed_now()).unwrap();
        assert_eq!(second.triggered_count, 0);
        assert_eq!(store.latest_events("alice", 50).unwrap().len(), 1);
        assert_eq!(
            store.enabled_rules("alice").unwrap()[0].last_triggered_date,
            Some(date(2024, 1, 4))
        );
    }

    #[test]
    fn latest_metrics_default_uses_trailing_window() {
        use marketlens::ports::data_port::DataPort;
        let store = seeded();
        let m = store.latest_metrics("AAA").unwrap().unwrap();
        assert_eq!(m.bar_date, date(2024, 1, 4));
        assert_eq!(m.prev_close, Some(3.0));
        assert_eq!(m.ma20, Some(2.5));
        assert!(store.latest_metrics("ZZZ").unwrap().is_none());
    }
}
