use poise::domain::{Category, TradeKind};
use poise::engine::MissingPriceError;
use poise::normalize::NormalizedBatch;
use poise::orchestration::Pipeline;
use poise::{
    ComputationError, Decimal, MalformedTradeError, MarkPrice, MarketId, PnlMode, RawFill, Side,
    TimeMs, Trade,
};
use poise::Normalizer;
use serde_json::json;
use std::collections::HashMap;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn activity(
    hash: &str,
    condition: &str,
    outcome: &str,
    side: &str,
    size: &str,
    price: &str,
    ts: i64,
    slug: &str,
) -> RawFill {
    serde_json::from_value(json!({
        "type": "TRADE",
        "conditionId": condition,
        "outcome": outcome,
        "side": side,
        "size": size,
        "price": price,
        "timestamp": ts,
        "transactionHash": hash,
        "slug": slug
    }))
    .unwrap()
}

fn mark(market: &str, price: &str) -> MarkPrice {
    MarkPrice::new(MarketId::new(market), d(price), TimeMs::new(1_700_000_900_000))
}

fn pipeline() -> Pipeline {
    Pipeline::new(Normalizer::new(), PnlMode::Gross)
}

#[test]
fn test_missing_price_degrades_only_that_market() {
    let pages = vec![vec![
        activity("0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "politics-a"),
        activity("0x2", "0xb", "Yes", "BUY", "20", "0.25", 1_700_000_100, "politics-b"),
    ]];

    let snapshot = pipeline()
        .run(&pages, vec![mark("0xa:Yes", "0.55")], 1, TimeMs::new(0))
        .unwrap();

    assert_eq!(snapshot.summary.total_unrealized_pnl, d("1.5"));
    assert_eq!(snapshot.summary.total_market_value, d("5.5"));
    assert_eq!(snapshot.summary.stale_positions, 1);

    let b = &snapshot.positions[&MarketId::new("0xb:Yes")];
    assert!(b.stale);
    assert_eq!(b.unrealized_pnl, Decimal::zero());
    assert_eq!(
        snapshot.missing_prices,
        vec![MissingPriceError::NoMark(MarketId::new("0xb:Yes"))]
    );
    assert!(snapshot.is_degraded());
}

#[test]
fn test_category_rollup_sums_to_total_market_value() {
    let pages = vec![vec![
        activity("0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "politics-a"),
        activity("0x2", "0xb", "No", "BUY", "7", "0.30", 1_700_000_100, "politics-b"),
        activity("0x3", "0xc", "Yes", "BUY", "12", "0.50", 1_700_000_200, "sports-c"),
        activity("0x4", "0xd", "Yes", "BUY", "3", "0.10", 1_700_000_300, ""),
    ]];
    let marks = vec![
        mark("0xa:Yes", "0.333333"),
        mark("0xb:No", "0.1234567"),
        mark("0xc:Yes", "0.61"),
        mark("0xd:Yes", "0.2"),
    ];

    let snapshot = pipeline().run(&pages, marks, 1, TimeMs::new(0)).unwrap();
    let per_category = &snapshot.summary.per_category;

    assert_eq!(per_category.len(), 3);
    assert_eq!(per_category[&Category::new("sports")].market_value, d("7.32"));
    assert_eq!(per_category[&Category::uncategorized()].market_value, d("0.6"));

    let rolled_up: Decimal = per_category.values().map(|c| c.market_value).sum();
    assert_eq!(rolled_up, snapshot.summary.total_market_value);
    let rolled_up_unrealized: Decimal = per_category.values().map(|c| c.unrealized_pnl).sum();
    assert_eq!(rolled_up_unrealized, snapshot.summary.total_unrealized_pnl);
}

#[test]
fn test_category_override_beats_slug() {
    let mut overrides = HashMap::new();
    overrides.insert("0xa".to_string(), Category::new("elections"));
    let pipeline = Pipeline::new(Normalizer::with_category_overrides(overrides), PnlMode::Net);
    let pages = vec![vec![activity(
        "0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "politics-a",
    )]];

    let snapshot = pipeline.run(&pages, vec![], 1, TimeMs::new(0)).unwrap();
    assert!(snapshot
        .summary
        .per_category
        .contains_key(&Category::new("elections")));
}

#[test]
fn test_fetch_order_does_not_matter_for_distinct_timestamps() {
    let a = activity("0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "x");
    let b = activity("0x2", "0xa", "Yes", "SELL", "5", "0.60", 1_700_000_100, "x");
    let c = activity("0x3", "0xa", "Yes", "BUY", "10", "0.80", 1_700_000_200, "x");
    let marks = vec![mark("0xa:Yes", "0.7")];

    let forward = pipeline()
        .run(&[vec![a.clone(), b.clone(), c.clone()]], marks.clone(), 1, TimeMs::new(0))
        .unwrap();
    let shuffled = pipeline()
        .run(&[vec![c], vec![a, b]], marks, 1, TimeMs::new(0))
        .unwrap();

    assert_eq!(forward.summary, shuffled.summary);
    assert_eq!(
        forward.positions[&MarketId::new("0xa:Yes")].position.realized_pnl,
        d("1")
    );
}

#[test]
fn test_same_timestamp_fills_keep_fetch_order() {
    // A flip and its follow-up share a timestamp; fetch order decides.
    let open = activity("0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "x");
    let close = activity("0x2", "0xa", "Yes", "SELL", "10", "0.60", 1_700_000_000, "x");

    let snapshot = pipeline()
        .run(&[vec![open], vec![close]], vec![], 1, TimeMs::new(0))
        .unwrap();
    let state = &snapshot.positions[&MarketId::new("0xa:Yes")].position;
    assert!(state.is_flat());
    assert_eq!(state.realized_pnl, d("2"));
}

#[test]
fn test_redeem_settles_resolved_market() {
    let pages = vec![vec![
        activity("0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "nba-a"),
        serde_json::from_value(json!({
            "type": "REDEEM",
            "conditionId": "0xa",
            "size": 10,
            "usdcSize": 10,
            "timestamp": 1_700_100_000,
            "transactionHash": "0xr"
        }))
        .unwrap(),
    ]];

    let snapshot = pipeline().run(&pages, vec![], 1, TimeMs::new(0)).unwrap();
    let state = &snapshot.positions[&MarketId::new("0xa:Yes")].position;
    assert!(state.is_flat());
    assert_eq!(state.realized_pnl, d("6"));
    assert_eq!(snapshot.summary.total_realized_pnl, d("6"));
    assert_eq!(snapshot.summary.open_positions, 0);
    assert!(snapshot.missing_prices.is_empty());
}

#[test]
fn test_net_mode_charges_fees_to_realized() {
    let mut buy = activity("0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "x");
    buy.fee = Some("0.04".into());
    let mut sell = activity("0x2", "0xa", "Yes", "SELL", "10", "0.50", 1_700_000_100, "x");
    sell.fee = Some("0.05".into());
    let pages = vec![vec![buy, sell]];

    let net = Pipeline::new(Normalizer::new(), PnlMode::Net)
        .run(&pages, vec![], 1, TimeMs::new(0))
        .unwrap();
    let gross = pipeline().run(&pages, vec![], 1, TimeMs::new(0)).unwrap();

    assert_eq!(net.summary.total_realized_pnl, d("0.91"));
    assert_eq!(gross.summary.total_realized_pnl, d("1"));
    assert_eq!(net.summary.total_fees, d("0.09"));
    assert_eq!(net.daily.total, d("0.91"));
}

#[test]
fn test_large_sizes_close_without_panicking() {
    let pages = vec![vec![
        activity("0x1", "0xa", "Yes", "BUY", "1000000000000000", "1", 1_700_000_000, "big-a"),
        activity("0x2", "0xa", "Yes", "SELL", "100000000000000", "1", 1_700_000_100, "big-a"),
    ]];

    let snapshot = Pipeline::default()
        .run(&pages, vec![mark("0xa:Yes", "1")], 1, TimeMs::new(0))
        .unwrap();

    let a = &snapshot.positions[&MarketId::new("0xa:Yes")];
    assert_eq!(a.position.signed_size, d("900000000000000"));
    assert_eq!(a.position.realized_pnl, Decimal::zero());
    assert_eq!(snapshot.summary.total_market_value, d("900000000000000"));
}

#[test]
fn test_unrepresentable_record_is_rejected() {
    let mut huge = activity(
        "0x1", "0xa", "Yes", "BUY", "79228162514264337593543950335", "1", 1_700_000_000, "big-a",
    );
    huge.fee_rate_bps = Some("20".into());
    let pages = vec![vec![
        huge,
        activity("0x2", "0xb", "Yes", "BUY", "10", "0.5", 1_700_000_100, "politics-b"),
    ]];

    let snapshot = pipeline().run(&pages, vec![], 1, TimeMs::new(0)).unwrap();
    assert_eq!(snapshot.trade_count, 1);
    assert_eq!(snapshot.rejected.len(), 1);
    assert_eq!(
        snapshot.rejected[0].error,
        MalformedTradeError::Overflow("fee_rate_bps")
    );
    assert!(snapshot.is_degraded());
}

#[test]
fn test_overflowing_positions_fail_the_cycle() {
    let max = "79228162514264337593543950335";
    let pages = vec![vec![
        activity("0x1", "0xa", "Yes", "BUY", max, "1", 1_700_000_000, "big-a"),
        activity("0x2", "0xa", "Yes", "BUY", max, "1", 1_700_000_100, "big-a"),
    ]];

    let err = pipeline().run(&pages, vec![], 1, TimeMs::new(0)).unwrap_err();
    assert!(matches!(err, ComputationError::Overflow { .. }));
}

#[test]
fn test_compute_rejects_invalid_trade() {
    let good = Trade {
        trade_key: "k1".to_string(),
        market_id: MarketId::new("0xa:Yes"),
        time_ms: TimeMs::new(1_700_000_000_000),
        api_sequence: None,
        ingestion_seq: 0,
        side: Side::Buy,
        size: d("10"),
        price: d("0.4"),
        fee: Decimal::zero(),
        kind: TradeKind::Fill,
    };
    let bad = Trade {
        trade_key: "k2".to_string(),
        time_ms: TimeMs::new(1_700_000_100_000),
        ingestion_seq: 1,
        size: d("-3"),
        ..good.clone()
    };
    let batch = NormalizedBatch {
        trades: vec![good, bad],
        ..NormalizedBatch::default()
    };

    let err = pipeline()
        .compute(batch, vec![mark("0xa:Yes", "0.5")], 1, TimeMs::new(0))
        .unwrap_err();
    assert_eq!(
        err,
        ComputationError::NonPositiveSize {
            trade_key: "k2".to_string(),
            size: d("-3"),
        }
    );
}

#[test]
fn test_titles_follow_positions() {
    let mut fill = activity("0x1", "0xa", "Yes", "BUY", "10", "0.40", 1_700_000_000, "politics-a");
    fill.title = Some("Who wins?".to_string());
    let pages = vec![vec![
        fill,
        activity("0x2", "0xa", "No", "BUY", "5", "0.60", 1_700_000_100, "politics-a"),
    ]];

    let snapshot = pipeline().run(&pages, vec![], 1, TimeMs::new(0)).unwrap();
    for market in ["0xa:Yes", "0xa:No"] {
        let position = &snapshot.positions[&MarketId::new(market)].position;
        assert_eq!(position.title.as_deref(), Some("Who wins?"));
    }
}
