//! End-to-end attribution scenarios over the full analysis pipeline.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use mahler_attribution::attribution::AttributionBasis;
use mahler_attribution::data::TradeAction;
use mahler_attribution::pricing::{BlackScholes, IvSolver, PricingConfig};
use mahler_attribution::{
    AnalysisPipeline, Greeks, InMemoryMarketData, OptionType, RawPositionRecord, TradeRecord,
};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
}

fn greeks(delta: f64, gamma: f64, theta: f64, vega: f64) -> Greeks {
    Greeks {
        delta,
        gamma,
        theta,
        vega,
        rho: 0.0,
    }
}

fn record(
    id: &str,
    day: u32,
    quantity: i32,
    spot: Decimal,
    price: Decimal,
    greeks: Greeks,
) -> RawPositionRecord {
    RawPositionRecord {
        date: date(day),
        position_id: Some(id.to_string()),
        underlying: "SPY".to_string(),
        symbol: format!("SPY-{}", id),
        option_type: OptionType::Put,
        strike: dec!(95),
        expiration: date(30),
        quantity,
        lot_size: 100,
        underlying_price: spot,
        option_price: price,
        iv: Some(0.2),
        greeks: Some(greeks),
        market_value: None,
        unrealized_pnl: None,
        hv: None,
        iv_rank: Some(45.0),
        iv_percentile: None,
        dte: None,
        entry_price: price,
        entry_date: None,
    }
}

fn trade(id: &str, action: TradeAction, day: u32, quantity: i32, fill: Decimal) -> TradeRecord {
    TradeRecord {
        position_id: Some(id.to_string()),
        action,
        trade_date: date(day),
        underlying: "SPY".to_string(),
        symbol: format!("SPY-{}", id),
        option_type: OptionType::Put,
        strike: dec!(95),
        expiration: date(30),
        quantity,
        lot_size: 100,
        fill_price: fill,
        underlying_price: None,
        realized_pnl: None,
        reason: None,
        reason_type: None,
        iv_rank: None,
    }
}

#[test]
fn test_atm_call_prices_and_solves_back() {
    let bs = BlackScholes::new(0.05, 0.0);
    let time = 30.0 / 365.0;

    let price = bs.call_price(100.0, 100.0, time, 0.20);
    assert_relative_eq!(price, 2.46, epsilon = 0.01);

    let iv = IvSolver::new(PricingConfig::default())
        .solve(price, 100.0, 100.0, time, OptionType::Call)
        .unwrap();
    assert!((iv - 0.20).abs() < 0.001);

    let delta = bs.delta(100.0, 100.0, time, 0.20, OptionType::Call);
    assert!((delta - 0.53).abs() <= 0.02);
}

#[test]
fn test_short_gamma_and_theta_components() {
    // Position-level Greeks for two short contracts.
    let g = greeks(0.6, 0.08, -5.0, 0.3);
    let records = vec![
        record("P1", 1, -2, dec!(100), dec!(2.00), g),
        record("P1", 2, -2, dec!(101), dec!(1.90), g),
    ];

    let report = AnalysisPipeline::default()
        .run(&records, &[], &InMemoryMarketData::new())
        .unwrap();

    // No open record: the first day is residual only.
    let first = &report.attribution.daily[0].positions[0];
    assert_eq!(first.basis, AttributionBasis::ResidualOnly);

    let row = &report.attribution.daily[1].positions[0];
    assert_eq!(row.basis, AttributionBasis::PriorSnapshot);
    assert_eq!(row.gamma_pnl, dec!(-4));
    assert_eq!(row.theta_pnl, dec!(-500));
    assert_eq!(row.delta_pnl, dec!(60));
    assert_eq!(row.vega_pnl, Decimal::ZERO);
    // -380 - (-400)
    assert_eq!(row.actual_pnl, dec!(20));
    assert!(row.is_reconciled());
}

#[test]
fn test_vanished_position_without_terminal_record_is_surfaced() {
    let g = greeks(-0.3, 0.04, 2.0, 0.1);
    let records = vec![
        record("P1", 1, -1, dec!(100), dec!(1.50), g),
        record("P2", 1, -1, dec!(100), dec!(1.20), g),
        record("P1", 2, -1, dec!(100), dec!(1.40), g),
        record("P2", 2, -1, dec!(100), dec!(1.10), g),
        // P1 is gone on day 3 with nothing in the trade log.
        record("P2", 3, -1, dec!(99), dec!(1.30), g),
    ];

    let report = AnalysisPipeline::default()
        .run(&records, &[], &InMemoryMarketData::new())
        .unwrap();
    let run = &report.attribution;

    let day3 = run.daily.iter().find(|d| d.date == date(3)).unwrap();
    assert_eq!(day3.position_count, 1);
    assert!(day3.positions.iter().all(|p| p.position_id == "P2"));

    assert_eq!(run.unattributed.len(), 1);
    let gap = &run.unattributed[0];
    assert_eq!(gap.position_id, "P1");
    assert_eq!(gap.last_seen, date(2));
    assert_eq!(gap.missing_on, date(3));
    assert_eq!(run.summary().unattributed, 1);
}

#[test]
fn test_weekend_expiry_keeps_other_positions_on_prior_snapshot() {
    let g = greeks(-0.3, 0.04, 2.0, 0.1);
    let records = vec![
        record("P1", 4, -1, dec!(100), dec!(0.40), g),
        record("P2", 4, -1, dec!(100), dec!(1.60), g),
        record("P1", 5, -1, dec!(100), dec!(0.10), g),
        record("P2", 5, -1, dec!(100), dec!(1.50), g),
        // P1 expires Saturday the 6th, P2 is next seen Monday the 8th.
        record("P2", 8, -1, dec!(100), dec!(1.40), g),
    ];
    let expiry = trade("P1", TradeAction::Expire, 6, -1, Decimal::ZERO);

    let report = AnalysisPipeline::default()
        .run(&records, &[expiry], &InMemoryMarketData::new())
        .unwrap();
    let run = &report.attribution;

    assert!(run.unattributed.is_empty());

    let saturday = run.daily.iter().find(|d| d.date == date(6)).unwrap();
    assert_eq!(saturday.position_count, 1);
    assert_eq!(saturday.positions[0].position_id, "P1");
    assert_eq!(saturday.positions[0].basis, AttributionBasis::Terminal);

    let monday = run.daily.iter().find(|d| d.date == date(8)).unwrap();
    let row = &monday.positions[0];
    assert_eq!(row.position_id, "P2");
    assert_eq!(row.basis, AttributionBasis::PriorSnapshot);
    // -140 - (-150)
    assert_eq!(row.actual_pnl, dec!(10));

    let p2 = run.trades.iter().find(|t| t.position_id == "P2").unwrap();
    let p2_rows: Decimal = run
        .daily
        .iter()
        .flat_map(|d| &d.positions)
        .filter(|p| p.position_id == "P2")
        .map(|p| p.actual_pnl)
        .sum();
    assert_eq!(p2.total_pnl, p2_rows);
}

#[test]
fn test_free_text_stop_loss_is_classified() {
    let g = greeks(-0.3, 0.04, 2.0, 0.1);
    let records = vec![
        record("P1", 1, -1, dec!(100), dec!(1.50), g),
        record("P1", 2, -1, dec!(97), dec!(3.10), g),
    ];
    let mut close = trade("P1", TradeAction::Close, 3, -1, dec!(3.20));
    close.reason = Some("Stop loss hit at 2x credit".to_string());
    close.realized_pnl = Some(dec!(-170));

    let report = AnalysisPipeline::default()
        .run(&records, &[close], &InMemoryMarketData::new())
        .unwrap();

    let by_reason = &report.slices["exit_reason"];
    assert_eq!(by_reason.len(), 1);
    assert_eq!(by_reason[0].label, "STOP_LOSS");
    assert_eq!(report.diagnosis.reversals.stop_loss_trades, 1);
}

#[test]
fn test_multi_position_run_reconciles_and_partitions() {
    let short_put = greeks(0.35, 0.05, 3.0, 0.2);
    let long_put = greeks(-0.25, 0.03, -1.5, 0.15);

    let mut records = Vec::new();
    let spots = [dec!(100), dec!(101.5), dec!(101.5), dec!(99), dec!(100.2)];
    let short_prices = [dec!(1.80), dec!(1.50), dec!(1.50), dec!(2.40), dec!(1.95)];
    let long_prices = [dec!(0.90), dec!(0.75), dec!(0.75), dec!(1.30), dec!(1.00)];
    for (i, spot) in spots.iter().enumerate() {
        let day = i as u32 + 1;
        records.push(record("S1", day, -3, *spot, short_prices[i], short_put));
        records.push(record("L1", day, 2, *spot, long_prices[i], long_put));
    }
    // QQQ position closes with a record on day 4.
    for (day, price) in [(1, dec!(2.50)), (2, dec!(2.20)), (3, dec!(2.20))] {
        let mut r = record("Q1", day, -1, dec!(400), price, short_put);
        r.underlying = "QQQ".to_string();
        r.strike = dec!(380);
        records.push(r);
    }

    let mut opens = Vec::new();
    for (id, qty, fill) in [("S1", -3, dec!(1.80)), ("L1", 2, dec!(0.90)), ("Q1", -1, dec!(2.50))] {
        let mut open = trade(id, TradeAction::Open, 1, qty, fill);
        open.underlying_price = Some(dec!(100));
        open.iv_rank = Some(if id == "L1" { 20.0 } else { 75.0 });
        if id == "Q1" {
            open.underlying = "QQQ".to_string();
            open.strike = dec!(380);
            open.underlying_price = Some(dec!(400));
        }
        opens.push(open);
    }
    let mut q_close = trade("Q1", TradeAction::Close, 4, -1, dec!(1.25));
    q_close.underlying = "QQQ".to_string();
    q_close.strike = dec!(380);
    q_close.underlying_price = Some(dec!(405));
    q_close.realized_pnl = Some(dec!(125));
    q_close.reason = Some("50% profit target".to_string());
    let mut trades = opens;
    trades.push(q_close);

    let market = InMemoryMarketData::new()
        .with_closes("VIX", (1..=5).map(|d| (date(d), 18.0)))
        .with_closes("SPY", (1..=5).map(|d| (date(d), 100.0)));

    let report = AnalysisPipeline::default()
        .run(&records, &trades, &market)
        .unwrap();
    let run = &report.attribution;

    assert_eq!(run.daily.len(), 5);
    assert!(run.unattributed.is_empty());
    for day in &run.daily {
        assert!(day.is_reconciled());
        assert!(day.positions.iter().all(|p| p.is_reconciled()));
    }

    let terminal = run
        .daily
        .iter()
        .flat_map(|d| &d.positions)
        .find(|p| p.basis == AttributionBasis::Terminal)
        .unwrap();
    assert_eq!(terminal.position_id, "Q1");
    assert_eq!(terminal.date, date(4));

    // Flat prices on day 3 leave nothing to explain.
    let flat = run.daily.iter().find(|d| d.date == date(3)).unwrap();
    assert_eq!(flat.total_pnl, Decimal::ZERO);
    assert_ne!(flat.theta_pnl, Decimal::ZERO);
    assert_eq!(flat.theta_pnl_pct, 0.0);
    assert_eq!(flat.delta_pnl_pct, 0.0);
    assert_eq!(flat.residual_pct, 0.0);

    let trade_total: Decimal = run.trades.iter().map(|t| t.total_pnl).sum();
    assert_eq!(run.trades.len(), 3);
    for (name, groups) in &report.slices {
        let grouped: Decimal = groups.iter().map(|g| g.total_pnl).sum();
        let count: usize = groups.iter().map(|g| g.trade_count).sum();
        assert_eq!(grouped, trade_total, "slice {} loses PnL", name);
        assert_eq!(count, run.trades.len(), "slice {} loses trades", name);
    }

    assert!(report
        .regimes
        .iter()
        .all(|r| r.label == "NORMAL_VOL_NEUTRAL"));
    assert_eq!(report.regime_stats.len(), 1);
    assert_eq!(report.regime_stats[0].trading_days, 5);
}
