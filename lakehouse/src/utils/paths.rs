use chrono::NaiveDate;
use common::config::Settings;
use common::schema::SourceKind;

const FORECAST_FILE_STEM: &str = "5-day forecast";
const UNIONED_FORECAST_FILE: &str = "all_historic_forecasts.csv";

/// Object names for every artifact the pipeline reads or writes, derived
/// from the configured base paths.
pub struct PathBuilder<'a> {
    settings: &'a Settings,
}

impl<'a> PathBuilder<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn individual_forecast(&self, user_name: &str) -> String {
        join(
            &self.settings.forecast_individual_csvpath,
            &format!("{}_{}.csv", FORECAST_FILE_STEM, user_name),
        )
    }

    pub fn combined_forecast(&self, capture_date: NaiveDate) -> String {
        join(
            &self.settings.forecast_csvpath,
            &format!("{}_{}.csv", FORECAST_FILE_STEM, capture_date.format("%Y-%m-%d")),
        )
    }

    pub fn daily_history(&self, day: NaiveDate) -> String {
        format!(
            "{}_{}.csv",
            normalize(&self.settings.wthr_historic_csvpath),
            day.format("%Y-%m-%d")
        )
    }

    /// Prefix shared by every daily snapshot that feeds the union.
    pub fn union_prefix(&self, kind: SourceKind) -> String {
        match kind {
            SourceKind::Forecast => normalize(&self.settings.forecast_csvpath),
            SourceKind::History => normalize(&self.settings.wthr_historic_csvpath),
        }
    }

    pub fn unioned(&self, kind: SourceKind) -> String {
        match kind {
            SourceKind::Forecast => join(&self.settings.forecast_unioned_csvpath, UNIONED_FORECAST_FILE),
            SourceKind::History => format!(
                "{}.csv",
                normalize(&self.settings.wthr_historic_unioned_csvpath)
            ),
        }
    }

    pub fn gcs_uri(&self, path: &str) -> String {
        format!("gs://{}/{}", self.settings.bucket_name, path)
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_string()
}

fn join(dir: &str, file_name: &str) -> String {
    let dir = normalize(dir);
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings() -> Settings {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"bucket_name: rainday\nforecast_csvpath: weather_forecast_csv\\daily\\\n")
            .unwrap();
        Settings::load(path.to_str().unwrap(), common::config::Profile::Local).unwrap()
    }

    #[test]
    fn test_forecast_paths() {
        let settings = settings();
        let paths = PathBuilder::new(&settings);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert_eq!(
            paths.combined_forecast(day),
            "weather_forecast_csv/daily/5-day forecast_2024-05-01.csv"
        );
        assert_eq!(
            paths.individual_forecast("A"),
            "weather_forecast_csv/most_recent_individual_forecasts/5-day forecast_A.csv"
        );
        assert_eq!(paths.union_prefix(SourceKind::Forecast), "weather_forecast_csv/daily");
        assert_eq!(
            paths.unioned(SourceKind::Forecast),
            "forecast_history_csv/all_historic_forecasts.csv"
        );
    }

    #[test]
    fn test_history_paths_share_union_prefix() {
        let settings = settings();
        let paths = PathBuilder::new(&settings);
        let day = NaiveDate::from_ymd_opt(2024, 4, 25).unwrap();

        let daily = paths.daily_history(day);
        assert_eq!(daily, "weather_history_csv/daily/historic_weather_2024-04-25.csv");
        assert!(daily.starts_with(&paths.union_prefix(SourceKind::History)));
        assert!(!paths.unioned(SourceKind::History).starts_with(&paths.union_prefix(SourceKind::History)));
        assert_eq!(
            paths.gcs_uri(&paths.unioned(SourceKind::History)),
            "gs://rainday/weather_history_csv/unioned/all_historic_weather.csv"
        );
    }
}
