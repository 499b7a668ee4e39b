use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use common::dataset::TabularRecord;
use common::schema::SourceKind;
use common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Hourly variables requested from the archive, in positional order.
pub const HISTORY_VARIABLES: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "apparent_temperature",
    "precipitation",
    "rain",
    "snowfall",
    "wind_speed_10m",
];

const DEFAULT_INTERVAL_SECS: i64 = 3600;

/// Body of the archive endpoint when called with `timeformat=unixtime`.
#[derive(Debug, Deserialize)]
pub struct ArchiveResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub hourly: ArchiveHourly,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveHourly {
    pub time: Vec<i64>,
    #[serde(flatten)]
    pub variables: HashMap<String, Vec<Option<f64>>>,
}

/// Hourly samples laid out as a time range plus positional variable columns.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyBlock {
    pub start: i64,
    /// Exclusive.
    pub end: i64,
    pub interval: i64,
    pub variables: Vec<Vec<Option<f64>>>,
}

impl HourlyBlock {
    pub fn from_archive(hourly: &ArchiveHourly) -> Result<Self> {
        let start = *hourly
            .time
            .first()
            .ok_or_else(|| Error::InvalidInput("archive response has no hourly samples".into()))?;
        let interval = match hourly.time.get(1) {
            Some(next) => next - start,
            None => DEFAULT_INTERVAL_SECS,
        };
        if interval <= 0 {
            return Err(Error::InvalidInput(format!(
                "archive response has a non-increasing time axis (interval {}s)",
                interval
            )));
        }
        let end = start + interval * hourly.time.len() as i64;

        let variables = HISTORY_VARIABLES
            .iter()
            .map(|name| {
                hourly.variables.get(*name).cloned().ok_or_else(|| {
                    Error::SchemaMismatch(format!("archive response is missing hourly '{}'", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let block = Self {
            start,
            end,
            interval,
            variables,
        };
        block.check_lengths()?;
        Ok(block)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        (self.start..self.end).step_by(self.interval as usize)
    }

    fn len(&self) -> usize {
        ((self.end - self.start) / self.interval) as usize
    }

    fn check_lengths(&self) -> Result<()> {
        let expected = self.len();
        for (index, values) in self.variables.iter().enumerate() {
            if values.len() != expected {
                return Err(Error::SchemaMismatch(format!(
                    "hourly variable {} has {} samples, time axis has {}",
                    HISTORY_VARIABLES.get(index).unwrap_or(&"?"),
                    values.len(),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Daily rows for one location, keeping only samples on 3-hour boundaries.
    pub fn into_daily_rows(&self, name: &str) -> Result<Vec<HistoryRow>> {
        self.check_lengths()?;

        let mut rows = Vec::new();
        for (index, ts) in self.timestamps().enumerate() {
            let datetime = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| Error::InvalidInput(format!("timestamp {} out of range", ts)))?
                .naive_utc();
            if datetime.hour() % 3 != 0 {
                continue;
            }
            rows.push(HistoryRow {
                weather_date: datetime.date(),
                forecast_datetime: datetime,
                temp: self.variables.first().and_then(|v| v[index]),
                temp_humidity: self.variables.get(1).and_then(|v| v[index]),
                name: name.to_string(),
            });
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub weather_date: NaiveDate,
    pub forecast_datetime: NaiveDateTime,
    pub temp: Option<f64>,
    pub temp_humidity: Option<f64>,
    pub name: String,
}

impl TabularRecord for HistoryRow {
    const SOURCE: SourceKind = SourceKind::History;

    fn values(&self) -> Vec<Option<String>> {
        vec![
            Some(self.weather_date.format("%Y-%m-%d").to_string()),
            Some(self.forecast_datetime.format("%Y-%m-%d %H:%M:%S").to_string()),
            self.temp.map(|t| t.to_string()),
            self.temp_humidity.map(|h| h.to_string()),
            Some(self.name.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_block(start: i64, hours: usize) -> HourlyBlock {
        HourlyBlock {
            start,
            end: start + 3600 * hours as i64,
            interval: 3600,
            variables: (0..HISTORY_VARIABLES.len())
                .map(|v| (0..hours).map(|h| Some((v * 100 + h) as f64)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_full_day_keeps_eight_rows() {
        // 2024-01-01T00:00:00Z
        let block = day_block(1_704_067_200, 24);
        let rows = block.into_daily_rows("A").unwrap();

        assert_eq!(rows.len(), 8);
        let hours: Vec<u32> = rows.iter().map(|r| r.forecast_datetime.hour()).collect();
        assert_eq!(hours, vec![0, 3, 6, 9, 12, 15, 18, 21]);
        assert!(rows.iter().all(|r| r.name == "A"));
        assert!(rows.iter().all(|r| r.weather_date == NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert_eq!(rows[1].temp, Some(3.0));
        assert_eq!(rows[1].temp_humidity, Some(103.0));
    }

    #[test]
    fn test_from_archive_orders_variables_by_position() {
        let mut json = serde_json::json!({
            "latitude": 1.0,
            "longitude": 2.0,
            "hourly": { "time": [1_704_067_200i64, 1_704_070_800i64] }
        });
        for (i, name) in HISTORY_VARIABLES.iter().enumerate() {
            json["hourly"][*name] = serde_json::json!([i as f64, null]);
        }
        let response: ArchiveResponse = serde_json::from_value(json).unwrap();

        let block = HourlyBlock::from_archive(&response.hourly).unwrap();
        assert_eq!(block.interval, 3600);
        assert_eq!(block.end, 1_704_067_200 + 7200);
        assert_eq!(block.variables[1], vec![Some(1.0), None]);
        assert_eq!(block.variables[6], vec![Some(6.0), None]);
    }

    #[test]
    fn test_missing_variable_is_rejected() {
        let json = serde_json::json!({
            "latitude": 1.0,
            "longitude": 2.0,
            "hourly": { "time": [1_704_067_200i64], "temperature_2m": [1.0] }
        });
        let response: ArchiveResponse = serde_json::from_value(json).unwrap();
        assert!(matches!(
            HourlyBlock::from_archive(&response.hourly),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_history_values_follow_history_columns() {
        let row = HistoryRow {
            weather_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            forecast_datetime: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap(),
            temp: Some(-1.5),
            temp_humidity: None,
            name: "B".into(),
        };
        assert_eq!(
            row.values(),
            vec![
                Some("2024-01-01".to_string()),
                Some("2024-01-01 03:00:00".to_string()),
                Some("-1.5".to_string()),
                None,
                Some("B".to_string()),
            ]
        );
    }
}
