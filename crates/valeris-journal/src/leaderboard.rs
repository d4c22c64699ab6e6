// Community leaderboard ranking.

use serde::Serialize;

use valeris_core::models::Trade;

use crate::stats::TradeStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based; 0 until ranked.
    pub rank: usize,
    pub user_id: String,
    pub display_name: String,
    pub total_trades: usize,
    pub win_rate: f64,
    pub net_pnl: f64,
}

impl LeaderboardEntry {
    /// Unranked entry summarising one user's closed trades.
    pub fn summarize(user_id: &str, display_name: &str, trades: &[Trade]) -> Self {
        let stats = TradeStats::compute(trades);
        LeaderboardEntry {
            rank: 0,
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            total_trades: stats.total_trades,
            win_rate: stats.win_rate,
            net_pnl: stats.net_pnl,
        }
    }
}

/// Drop users under `min_trades`, order by net pnl then win rate (both
/// descending) then display name, and assign dense ranks: entries equal on
/// both numbers share a rank and the next rank follows without a gap.
pub fn rank(mut entries: Vec<LeaderboardEntry>, min_trades: usize) -> Vec<LeaderboardEntry> {
    entries.retain(|e| e.total_trades >= min_trades);
    entries.sort_by(|a, b| {
        b.net_pnl
            .total_cmp(&a.net_pnl)
            .then_with(|| b.win_rate.total_cmp(&a.win_rate))
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    let mut current = 0;
    let mut previous: Option<(f64, f64)> = None;
    for entry in &mut entries {
        let key = (entry.net_pnl, entry.win_rate);
        if previous != Some(key) {
            current += 1;
            previous = Some(key);
        }
        entry.rank = current;
    }
    entries
}
