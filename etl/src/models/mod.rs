mod forecast;
mod history;

pub use forecast::{ForecastEntry, ForecastMain, ForecastResponse, ForecastRow, RainCategory, WeatherCondition};
pub use history::{ArchiveHourly, ArchiveResponse, HistoryRow, HourlyBlock, HISTORY_VARIABLES};
