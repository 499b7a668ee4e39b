use chrono::NaiveDate;
use common::dataset::TabularRecord;
use common::schema::SourceKind;
use serde::Deserialize;

/// Body of the 5-day / 3-hour forecast endpoint.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastEntry {
    pub dt: i64,
    pub dt_txt: String,
    pub main: ForecastMain,
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastMain {
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: f64,
}

#[derive(Debug, Deserialize)]
pub struct WeatherCondition {
    pub id: u32,
    pub main: String,
    pub description: String,
}

/// How likely a forecast slot is to rain out, ranked by the condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainCategory {
    NoRain,
    Drizzle,
    LightRain,
    ModerateRain,
    HeavyRain,
    Thunderstorm,
    Snow,
}

impl RainCategory {
    pub fn from_condition_code(code: u32) -> Self {
        match code {
            200..=299 => RainCategory::Thunderstorm,
            300..=399 => RainCategory::Drizzle,
            500 | 520 => RainCategory::LightRain,
            501 | 511 | 521 => RainCategory::ModerateRain,
            502..=504 | 522 | 531 => RainCategory::HeavyRain,
            600..=699 => RainCategory::Snow,
            _ => RainCategory::NoRain,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RainCategory::NoRain => "no rain",
            RainCategory::Drizzle => "drizzle",
            RainCategory::LightRain => "light rain",
            RainCategory::ModerateRain => "moderate rain",
            RainCategory::HeavyRain => "heavy rain",
            RainCategory::Thunderstorm => "thunderstorm",
            RainCategory::Snow => "snow",
        }
    }

    pub fn value(self) -> u8 {
        match self {
            RainCategory::NoRain => 0,
            RainCategory::Drizzle => 1,
            RainCategory::LightRain => 2,
            RainCategory::ModerateRain => 3,
            RainCategory::HeavyRain => 4,
            RainCategory::Thunderstorm => 5,
            RainCategory::Snow => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub forecast_capture_date: NaiveDate,
    pub forecast_dateunix: i64,
    pub forecast_datestring: String,
    pub name: String,
    pub rain_category: RainCategory,
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub temp_humidity: f64,
    pub weather_class: Option<String>,
    pub weather_description: Option<String>,
}

impl ForecastRow {
    pub fn from_entry(entry: &ForecastEntry, name: &str, capture_date: NaiveDate) -> Self {
        let condition = entry.weather.first();
        let rain_category = condition
            .map(|c| RainCategory::from_condition_code(c.id))
            .unwrap_or(RainCategory::NoRain);

        Self {
            forecast_capture_date: capture_date,
            forecast_dateunix: entry.dt,
            forecast_datestring: entry.dt_txt.clone(),
            name: name.to_string(),
            rain_category,
            temp: entry.main.temp,
            temp_min: entry.main.temp_min,
            temp_max: entry.main.temp_max,
            temp_humidity: entry.main.humidity,
            weather_class: condition.map(|c| c.main.clone()),
            weather_description: condition.map(|c| c.description.clone()),
        }
    }
}

impl TabularRecord for ForecastRow {
    const SOURCE: SourceKind = SourceKind::Forecast;

    fn values(&self) -> Vec<Option<String>> {
        vec![
            Some(self.forecast_capture_date.format("%Y-%m-%d").to_string()),
            Some(self.forecast_dateunix.to_string()),
            Some(self.forecast_datestring.clone()),
            Some(self.name.clone()),
            Some(self.rain_category.label().to_string()),
            Some(self.rain_category.value().to_string()),
            Some(self.temp.to_string()),
            Some(self.temp_min.to_string()),
            Some(self.temp_max.to_string()),
            Some(self.temp_humidity.to_string()),
            self.weather_class.clone(),
            self.weather_description.clone(),
        ]
    }
}
