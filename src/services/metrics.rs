//! Derived spend metrics.
//!
//! Every metric is a pure function of the stored record set and a single
//! instant. The public methods capture `Utc::now()` once and delegate to
//! `_at` variants, which the tests drive with fixed instants.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::{
    db::{DbPool, DbResult},
    models::CostRecordFilter,
};

/// Trailing window used for the normalized burn rate.
pub const DEFAULT_BURN_WINDOW_DAYS: u32 = 30;

/// Days per month used to normalize trailing burn to a monthly figure.
const NORMALIZATION_DAYS: f64 = 30.0;

#[derive(Clone)]
pub struct MetricsService {
    db: Arc<DbPool>,
}

/// All metrics computed against one shared instant.
#[derive(Debug, Serialize)]
pub struct SpendOverview {
    pub project: Option<String>,
    pub mtd_spend: f64,
    pub daily_burn_rate_mtd: f64,
    /// Trailing-window burn normalized to a 30-day month.
    pub trailing_burn_rate_monthly: f64,
    pub burn_window_days: u32,
    pub projected_month_end_spend: f64,
    pub as_of: DateTime<Utc>,
}

impl MetricsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Month-to-date spend: all records from the first of the current month
    /// onward. No upper bound, so forward-dated records within the month
    /// count too. Empty sets yield `0.0`.
    pub async fn mtd_spend(&self, project: Option<String>) -> DbResult<f64> {
        self.mtd_spend_at(project, Utc::now()).await
    }

    pub(crate) async fn mtd_spend_at(
        &self,
        project: Option<String>,
        now: DateTime<Utc>,
    ) -> DbResult<f64> {
        let filter = CostRecordFilter {
            project,
            start_date: Some(month_start(now)),
            ..Default::default()
        };
        self.db.cost_records().sum_cost(&filter).await
    }

    /// Spend over the trailing window, normalized to a 30-day month.
    pub async fn trailing_burn_rate(
        &self,
        project: Option<String>,
        window_days: u32,
    ) -> DbResult<f64> {
        self.trailing_burn_rate_at(project, window_days, Utc::now())
            .await
    }

    pub(crate) async fn trailing_burn_rate_at(
        &self,
        project: Option<String>,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> DbResult<f64> {
        let window_days = window_days.max(1);
        let filter = CostRecordFilter {
            project,
            start_date: Some(now - Duration::days(i64::from(window_days))),
            end_date: Some(now),
            ..Default::default()
        };
        let window_spend = self.db.cost_records().sum_cost(&filter).await?;
        Ok(window_spend / f64::from(window_days) * NORMALIZATION_DAYS)
    }

    /// MTD spend divided by elapsed calendar days of the month. The divisor
    /// is the day-of-month, so it is 1 on the first and never zero.
    pub async fn daily_burn_rate_mtd(&self, project: Option<String>) -> DbResult<f64> {
        self.daily_burn_rate_mtd_at(project, Utc::now()).await
    }

    pub(crate) async fn daily_burn_rate_mtd_at(
        &self,
        project: Option<String>,
        now: DateTime<Utc>,
    ) -> DbResult<f64> {
        let mtd = self.mtd_spend_at(project, now).await?;
        Ok(mtd / f64::from(days_elapsed_in_month(now)))
    }

    /// `MTD spend + daily burn rate * days remaining in the month`, where
    /// days remaining comes from real month-boundary math.
    pub async fn projected_month_end(&self, project: Option<String>) -> DbResult<f64> {
        self.projected_month_end_at(project, Utc::now()).await
    }

    pub(crate) async fn projected_month_end_at(
        &self,
        project: Option<String>,
        now: DateTime<Utc>,
    ) -> DbResult<f64> {
        let mtd = self.mtd_spend_at(project.clone(), now).await?;
        let daily = mtd / f64::from(days_elapsed_in_month(now));
        Ok(mtd + daily * f64::from(days_remaining_in_month(now)))
    }

    /// All metrics against one shared instant.
    pub async fn overview(&self, project: Option<String>) -> DbResult<SpendOverview> {
        self.overview_at(project, Utc::now()).await
    }

    pub(crate) async fn overview_at(
        &self,
        project: Option<String>,
        now: DateTime<Utc>,
    ) -> DbResult<SpendOverview> {
        let mtd = self.mtd_spend_at(project.clone(), now).await?;
        let daily = mtd / f64::from(days_elapsed_in_month(now));
        let trailing = self
            .trailing_burn_rate_at(project.clone(), DEFAULT_BURN_WINDOW_DAYS, now)
            .await?;
        Ok(SpendOverview {
            project,
            mtd_spend: mtd,
            daily_burn_rate_mtd: daily,
            trailing_burn_rate_monthly: trailing,
            burn_window_days: DEFAULT_BURN_WINDOW_DAYS,
            projected_month_end_spend: mtd + daily * f64::from(days_remaining_in_month(now)),
            as_of: now,
        })
    }
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month at midnight is always valid")
}

fn days_elapsed_in_month(now: DateTime<Utc>) -> u32 {
    now.day()
}

/// Derived from the actual last day of the month, never a hardcoded 28-31.
fn days_remaining_in_month(now: DateTime<Utc>) -> u32 {
    last_day_of_month(now.year(), now.month()) - now.day()
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .expect("month boundaries are always valid dates")
        .day()
}
