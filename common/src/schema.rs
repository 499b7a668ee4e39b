use arrow::datatypes::{DataType, Field, Schema};
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;

/// The external system a row-set came from. Each source has its own fixed
/// column list; crossing sources requires an explicit projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Forecast,
    History,
}

impl SourceKind {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            SourceKind::Forecast => FORECAST_COLUMNS,
            SourceKind::History => HISTORY_COLUMNS,
        }
    }

    pub fn arrow_schema(self) -> &'static Schema {
        match self {
            SourceKind::Forecast => &FORECAST_SCHEMA,
            SourceKind::History => &HISTORY_SCHEMA,
        }
    }

    pub fn fallback_table_schema(self) -> &'static TableSchema {
        match self {
            SourceKind::Forecast => &FORECAST_TABLE_SCHEMA,
            SourceKind::History => &HISTORY_TABLE_SCHEMA,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Forecast => f.write_str("forecast"),
            SourceKind::History => f.write_str("history"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "forecast" => Ok(SourceKind::Forecast),
            "history" => Ok(SourceKind::History),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown source kind '{}', expected 'forecast' or 'history'",
                other
            ))),
        }
    }
}

pub const FORECAST_COLUMNS: &[&str] = &[
    "forecast_capture_date",
    "forecast_dateunix",
    "forecast_datestring",
    "name",
    "rain_category",
    "rain_category_value",
    "temp",
    "temp_min",
    "temp_max",
    "temp_humidity",
    "weather_class",
    "weather_description",
];

pub const HISTORY_COLUMNS: &[&str] = &[
    "weather_date",
    "forecast_datetime",
    "temp",
    "temp_humidity",
    "name",
];

/// Every dataset column is carried as nullable text; typing happens in the warehouse.
pub fn text_schema<S: AsRef<str>>(columns: &[S]) -> Schema {
    Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name.as_ref(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    )
}

/// Warehouse column storage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Timestamp,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Column-to-type mapping used only when a destination table has to be created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub fields: Vec<ColumnSpec>,
}

impl TableSchema {
    /// All columns typed as unconstrained strings.
    pub fn all_strings(columns: &[&str]) -> Self {
        Self {
            fields: columns
                .iter()
                .map(|name| ColumnSpec {
                    name: name.to_string(),
                    column_type: ColumnType::String,
                })
                .collect(),
        }
    }

    pub fn with_override(mut self, column: &str, column_type: ColumnType) -> Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == column) {
            field.column_type = column_type;
        }
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

lazy_static! {
    static ref FORECAST_SCHEMA: Schema = text_schema(FORECAST_COLUMNS);
    static ref HISTORY_SCHEMA: Schema = text_schema(HISTORY_COLUMNS);
    static ref FORECAST_TABLE_SCHEMA: TableSchema = TableSchema::all_strings(FORECAST_COLUMNS);
    static ref HISTORY_TABLE_SCHEMA: TableSchema = TableSchema::all_strings(HISTORY_COLUMNS);
}
