use crate::models::*;

/// Equity index (starting at 1.0) after each trade, ordered by entry date
/// then instrument. Each trade is applied to the whole index in turn;
/// overlapping positions are not split into a shared capital base.
pub fn equity_curve(trades: &[Trade], convention: EquityConvention) -> Vec<EquityPoint> {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by(|a, b| {
        a.snapshot_date
            .cmp(&b.snapshot_date)
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });

    let mut equity = 1.0;
    ordered
        .into_iter()
        .map(|trade| {
            let r = trade.return_pct / 100.0;
            equity = match convention {
                EquityConvention::Compounded => equity * (1.0 + r),
                EquityConvention::Additive => equity + r,
            };
            EquityPoint {
                date: trade.snapshot_date,
                instrument_id: trade.instrument_id.clone(),
                return_pct: trade.return_pct,
                equity,
            }
        })
        .collect()
}

/// Last equity value; 1.0 for an empty curve.
pub fn final_equity(curve: &[EquityPoint]) -> f64 {
    curve.last().map(|p| p.equity).unwrap_or(1.0)
}

/// Largest peak-to-trough fall of the curve, as a positive percentage.
pub fn curve_drawdown_pct(curve: &[EquityPoint]) -> f64 {
    let mut peak: f64 = 1.0;
    let mut worst: f64 = 0.0;
    for point in curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            worst = worst.max((peak - point.equity) / peak * 100.0);
        }
    }
    worst
}
