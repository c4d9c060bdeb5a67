//! Read-side analytics composer
//!
//! Answers "show me this product's (or this user's) stats over the last N
//! days" from the precomputed daily rollup rows. The composer zero-fills the
//! series so callers always receive exactly `window_days` consecutive
//! calendar days ending today, with explicit zero entries where no rollup row
//! exists. Lifetime totals come from the product row's cached counters, not
//! from summing the series; the two are independently maintained views and
//! are not guaranteed to agree.

use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::*,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Number of ranking entries returned on the user dashboard
const TOP_PRODUCTS_LIMIT: i64 = 5;

/// Default and maximum window sizes for series requests
pub const DEFAULT_WINDOW_DAYS: u32 = 30;
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Builds a contiguous daily series of exactly `window_days` entries ending
/// on `today`, taking matching rollup values where present and synthesizing
/// zeros elsewhere
pub fn fill_daily_series(
    rows: &[(NaiveDate, DailyMeasures)],
    window_days: u32,
    today: NaiveDate,
) -> Vec<DailySeriesPoint> {
    let by_date: HashMap<NaiveDate, &DailyMeasures> =
        rows.iter().map(|(date, measures)| (*date, measures)).collect();

    (0..window_days)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset as i64);
            match by_date.get(&date) {
                Some(measures) => DailySeriesPoint {
                    date,
                    views: measures.views,
                    likes: measures.likes,
                    sales: measures.sales,
                    revenue: measures.revenue,
                },
                None => DailySeriesPoint {
                    date,
                    views: 0,
                    likes: 0,
                    sales: 0,
                    revenue: Decimal::ZERO,
                },
            }
        })
        .collect()
}

/// Service composing dashboard-ready series from rollup rows
#[derive(Clone)]
pub struct AnalyticsService {
    database: Arc<Database>,
}

impl AnalyticsService {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Zero-filled daily series plus lifetime totals for one product
    ///
    /// Only the owning user may read a product's analytics.
    pub async fn compose_product_series(
        &self,
        actor_id: Uuid,
        product_id: Uuid,
        window_days: u32,
    ) -> AppResult<ProductSeries> {
        let window_days = clamp_window(window_days)?;

        let product = self
            .database
            .get_product_by_id(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        if product.user_id != actor_id {
            return Err(AppError::Auth("Not the owner of this product".to_string()));
        }

        let today = Utc::now().date_naive();
        let from_date = today - Duration::days(window_days as i64 - 1);

        let rows = self
            .database
            .get_daily_analytics_since(product_id, from_date)
            .await?;

        let keyed: Vec<(NaiveDate, DailyMeasures)> = rows
            .into_iter()
            .map(|row| {
                (
                    row.date,
                    DailyMeasures {
                        views: row.views,
                        likes: row.likes,
                        sales: row.sales,
                        revenue: row.revenue,
                    },
                )
            })
            .collect();

        Ok(ProductSeries {
            product_id,
            window_days,
            series: fill_daily_series(&keyed, window_days, today),
            lifetime: LifetimeTotals::from(&product),
        })
    }

    /// Zero-filled series summed across all of a user's products, plus a
    /// top-N ranking by lifetime views
    pub async fn compose_user_dashboard(
        &self,
        user_id: Uuid,
        window_days: u32,
    ) -> AppResult<UserDashboard> {
        let window_days = clamp_window(window_days)?;

        let today = Utc::now().date_naive();
        let from_date = today - Duration::days(window_days as i64 - 1);

        let rows = self
            .database
            .get_user_daily_totals_since(user_id, from_date)
            .await?;

        let keyed: Vec<(NaiveDate, DailyMeasures)> = rows
            .into_iter()
            .map(|row| {
                (
                    row.date,
                    DailyMeasures {
                        views: row.views,
                        likes: row.likes,
                        sales: row.sales,
                        revenue: row.revenue,
                    },
                )
            })
            .collect();

        let top_products = self
            .database
            .get_top_products(user_id, TOP_PRODUCTS_LIMIT)
            .await?;

        Ok(UserDashboard {
            user_id,
            window_days,
            series: fill_daily_series(&keyed, window_days, today),
            top_products,
        })
    }
}

fn clamp_window(window_days: u32) -> AppResult<u32> {
    if window_days == 0 {
        return Err(AppError::Validation("Window must cover at least one day".to_string()));
    }
    Ok(window_days.min(MAX_WINDOW_DAYS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use rust_decimal_macros::dec;

    fn measures(views: i64, likes: i64, sales: i64, revenue: Decimal) -> DailyMeasures {
        DailyMeasures {
            views,
            likes,
            sales,
            revenue,
        }
    }

    /// Tests that the series always has exactly `window_days` consecutive
    /// entries ending today, regardless of how many rollup rows exist
    #[test]
    fn test_zero_fill_completeness() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let rows = vec![
            (NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(), measures(3, 1, 0, dec!(0))),
            (NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(), measures(7, 0, 2, dec!(25.50))),
        ];

        let series = fill_daily_series(&rows, 30, today);

        assert_eq!(series.len(), 30);
        assert_eq!(series.last().unwrap().date, today);
        assert_eq!(series.first().unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        // Strictly increasing consecutive dates.
        for pair in series.windows(2) {
            assert_eq!(pair[1].date - pair[0].date, Duration::days(1));
        }

        let jan5 = series.iter().find(|p| p.date.day() == 5).unwrap();
        assert_eq!(jan5.views, 3);
        assert_eq!(jan5.likes, 1);

        let jan30 = series.iter().find(|p| p.date.day() == 30).unwrap();
        assert_eq!(jan30.revenue, dec!(25.50));

        // Days without a rollup row get explicit zeros.
        let jan10 = series.iter().find(|p| p.date.day() == 10).unwrap();
        assert_eq!(jan10.views, 0);
        assert_eq!(jan10.revenue, Decimal::ZERO);
    }

    /// Tests a window with no rollup rows at all
    #[test]
    fn test_zero_fill_empty_window() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let series = fill_daily_series(&[], 7, today);

        assert_eq!(series.len(), 7);
        assert!(series.iter().all(|p| p.views == 0 && p.likes == 0 && p.sales == 0));
        assert!(series.iter().all(|p| p.revenue == Decimal::ZERO));
    }

    /// Tests that rollup rows older than the window are excluded
    #[test]
    fn test_rows_outside_window_ignored() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let rows = vec![
            (NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), measures(99, 9, 9, dec!(99))),
            (today, measures(4, 2, 1, dec!(10.00))),
        ];

        let series = fill_daily_series(&rows, 7, today);

        assert_eq!(series.len(), 7);
        assert_eq!(series.last().unwrap().views, 4);
        assert!(series.iter().all(|p| p.views != 99));
    }

    /// Tests a single-day window
    #[test]
    fn test_single_day_window() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let rows = vec![(today, measures(1, 0, 0, dec!(0)))];

        let series = fill_daily_series(&rows, 1, today);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].date, today);
        assert_eq!(series[0].views, 1);
    }

    /// Tests window clamping and the zero-window rejection
    #[test]
    fn test_window_clamping() {
        assert!(clamp_window(0).is_err());
        assert_eq!(clamp_window(30).unwrap(), 30);
        assert_eq!(clamp_window(10_000).unwrap(), MAX_WINDOW_DAYS);
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_series_denied_to_non_owner() {
        let config = crate::config::Config::load().unwrap();
        let db = Arc::new(Database::new(&config.database_url, 2).await.unwrap());
        db.migrate().await.unwrap();
        let analytics = AnalyticsService::new(db.clone());

        let owner = db.create_user("series-owner@test.local", None, "hash").await.unwrap();
        let stranger = db.create_user("series-stranger@test.local", None, "hash").await.unwrap();
        let product = db
            .create_product(
                owner.id,
                crate::models::CreateProductRequest {
                    title: "Retro handheld shelf".to_string(),
                    description: None,
                    price: dec!(12.00),
                },
            )
            .await
            .unwrap();

        assert!(analytics
            .compose_product_series(owner.id, product.id, 7)
            .await
            .is_ok());

        let err = analytics
            .compose_product_series(stranger.id, product.id, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
