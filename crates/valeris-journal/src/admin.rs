// Admin dashboard metrics: users, revenue, churn and support load.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use valeris_core::models::{Profile, Subscription, SubscriptionStatus, SupportTicket};

/// Ticket workflow, including `TicketStatus::can_transition`.
pub use valeris_core::models::TicketStatus;

/// Length of the "recent" window for signups and churn.
pub const WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminMetrics {
    pub total_users: usize,
    pub new_users_30d: usize,
    /// Active plus trialing subscriptions.
    pub active_subscriptions: usize,
    /// Monthly recurring revenue from active subscriptions, in cents.
    pub mrr_cents: i64,
    /// Cancellations in the window over (active + those cancellations), as
    /// a percentage.
    pub churn_rate: f64,
    /// Active subscriptions per plan.
    pub plan_distribution: BTreeMap<String, usize>,
    pub open_tickets: usize,
    pub in_progress_tickets: usize,
    pub resolved_tickets: usize,
    pub closed_tickets: usize,
    /// Mean hours from creation to resolution over tickets that have a
    /// resolution time; 0 when none do.
    pub avg_resolution_hours: f64,
}

impl AdminMetrics {
    pub fn compute(
        profiles: &[Profile],
        subscriptions: &[Subscription],
        tickets: &[SupportTicket],
        now: DateTime<Utc>,
    ) -> Self {
        let window_start = now - Duration::days(WINDOW_DAYS);
        let mut metrics = AdminMetrics {
            total_users: profiles.len(),
            new_users_30d: profiles
                .iter()
                .filter(|p| p.created_at >= window_start && p.created_at <= now)
                .count(),
            ..Default::default()
        };

        let mut canceled_in_window = 0usize;
        for sub in subscriptions {
            if sub.status.is_active() {
                metrics.active_subscriptions += 1;
                metrics.mrr_cents += sub.price_cents;
                *metrics
                    .plan_distribution
                    .entry(sub.plan.as_str().to_string())
                    .or_default() += 1;
            } else if sub.status == SubscriptionStatus::Canceled
                && sub.canceled_at.is_some_and(|t| t >= window_start && t <= now)
            {
                canceled_in_window += 1;
            }
        }
        let churn_base = metrics.active_subscriptions + canceled_in_window;
        if churn_base > 0 {
            metrics.churn_rate = canceled_in_window as f64 / churn_base as f64 * 100.0;
        }

        let mut resolution_hours = Vec::new();
        for ticket in tickets {
            match ticket.status {
                TicketStatus::Open => metrics.open_tickets += 1,
                TicketStatus::InProgress => metrics.in_progress_tickets += 1,
                TicketStatus::Resolved => metrics.resolved_tickets += 1,
                TicketStatus::Closed => metrics.closed_tickets += 1,
            }
            if let Some(resolved) = ticket.resolved_at {
                let minutes = (resolved - ticket.created_at).num_minutes().max(0);
                resolution_hours.push(minutes as f64 / 60.0);
            }
        }
        if !resolution_hours.is_empty() {
            metrics.avg_resolution_hours =
                resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64;
        }

        metrics
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Signups per UTC day for the `days` days ending today, oldest first,
/// including days with none.
pub fn signups_per_day(profiles: &[Profile], days: u32, now: DateTime<Utc>) -> Vec<DailyCount> {
    let today = now.date_naive();
    let mut counts: BTreeMap<NaiveDate, usize> = (0..days as i64)
        .map(|back| (today - Duration::days(back), 0))
        .collect();
    for profile in profiles {
        if let Some(count) = counts.get_mut(&profile.created_at.date_naive()) {
            *count += 1;
        }
    }
    counts
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use valeris_core::models::{Plan, Role, TicketPriority};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 30, 12, 0, 0).unwrap()
    }

    fn profile(id: &str, days_ago: i64) -> Profile {
        Profile {
            id: id.into(),
            email: format!("{id}@example.com"),
            display_name: id.into(),
            role: Role::Trader,
            created_at: now() - Duration::days(days_ago),
            two_factor_enabled: false,
            last_seen_at: None,
        }
    }

    fn sub(id: &str, plan: Plan, status: SubscriptionStatus, cents: i64, canceled_days_ago: Option<i64>) -> Subscription {
        Subscription {
            id: id.into(),
            user_id: id.into(),
            plan,
            status,
            price_cents: cents,
            started_at: now() - Duration::days(90),
            canceled_at: canceled_days_ago.map(|d| now() - Duration::days(d)),
        }
    }

    fn ticket(status: TicketStatus, resolved_after_hours: Option<i64>) -> SupportTicket {
        let created = now() - Duration::days(2);
        SupportTicket {
            id: format!("{status}"),
            user_id: "u".into(),
            subject: "s".into(),
            body: "b".into(),
            status,
            priority: TicketPriority::Normal,
            created_at: created,
            updated_at: created,
            resolved_at: resolved_after_hours.map(|h| created + Duration::hours(h)),
        }
    }

    #[test]
    fn revenue_churn_and_plans() {
        let subs = vec![
            sub("a", Plan::Pro, SubscriptionStatus::Active, 2900, None),
            sub("b", Plan::Pro, SubscriptionStatus::Trialing, 2900, None),
            sub("c", Plan::Elite, SubscriptionStatus::Active, 9900, None),
            sub("d", Plan::Pro, SubscriptionStatus::Canceled, 2900, Some(5)),
            sub("e", Plan::Pro, SubscriptionStatus::Canceled, 2900, Some(60)),
            sub("f", Plan::Free, SubscriptionStatus::PastDue, 0, None),
        ];
        let m = AdminMetrics::compute(&[], &subs, &[], now());
        assert_eq!(m.active_subscriptions, 3);
        assert_eq!(m.mrr_cents, 15_700);
        assert_eq!(m.churn_rate, 25.0);
        assert_eq!(m.plan_distribution.get("pro"), Some(&2));
        assert_eq!(m.plan_distribution.get("elite"), Some(&1));
        assert_eq!(m.plan_distribution.get("free"), None);
    }

    #[test]
    fn users_and_tickets() {
        let profiles = vec![profile("old", 45), profile("new", 3), profile("today", 0)];
        let tickets = vec![
            ticket(TicketStatus::Open, None),
            ticket(TicketStatus::InProgress, None),
            ticket(TicketStatus::Resolved, Some(4)),
            ticket(TicketStatus::Closed, Some(10)),
        ];
        let m = AdminMetrics::compute(&profiles, &[], &tickets, now());
        assert_eq!(m.total_users, 3);
        assert_eq!(m.new_users_30d, 2);
        assert_eq!((m.open_tickets, m.in_progress_tickets), (1, 1));
        assert_eq!((m.resolved_tickets, m.closed_tickets), (1, 1));
        assert_eq!(m.avg_resolution_hours, 7.0);
        assert_eq!(m.churn_rate, 0.0);
    }

    #[test]
    fn signups_are_zero_filled() {
        let profiles = vec![profile("a", 0), profile("b", 0), profile("c", 2), profile("d", 9)];
        let series = signups_per_day(&profiles, 3, now());
        let counts: Vec<usize> = series.iter().map(|d| d.count).collect();
        assert_eq!(counts, vec![1, 0, 2]);
        assert_eq!(series[2].date, NaiveDate::from_ymd_opt(2026, 6, 30).unwrap());
    }
}
