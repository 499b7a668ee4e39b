use chrono::{Days, NaiveDate, Utc};
use common::{Error, Result};
use rand::Rng;

/// Sleeps for `base_ms` plus up to `jitter_ms` of random extra delay.
pub async fn sleep_with_jitter(base_ms: u64, jitter_ms: u64) {
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    tokio::time::sleep(std::time::Duration::from_millis(base_ms + jitter)).await;
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days_before(date: NaiveDate, days: u32) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(u64::from(days)))
        .ok_or_else(|| Error::InvalidInput(format!("{} days before {} is out of range", days, date)))
}
