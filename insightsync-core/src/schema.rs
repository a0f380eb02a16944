use crate::normalize::NormalizedRow;
use chrono::NaiveDate;
use polars::prelude::*;

/// Column names in table order.
pub const COLUMNS: &[&str] = &[
    "load_timestamp",
    "load_date",
    "date_start",
    "date_stop",
    "account_id",
    "campaign_id",
    "campaign_name",
    "objective",
    "publisher_platform",
    "reach",
    "impressions",
    "clicks",
    "spend",
    "ctr",
    "cpc",
    "cpm",
    "meta_row_json",
];

/// Fixed schema of the insights table.
pub struct InsightsSchema;

impl InsightsSchema {
    /// Get the canonical table schema
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("load_timestamp".into(), DataType::Datetime(TimeUnit::Microseconds, None)),
            Field::new("load_date".into(), DataType::Date),
            Field::new("date_start".into(), DataType::String),
            Field::new("date_stop".into(), DataType::String),
            Field::new("account_id".into(), DataType::String),
            Field::new("campaign_id".into(), DataType::String),
            Field::new("campaign_name".into(), DataType::String),
            Field::new("objective".into(), DataType::String),
            Field::new("publisher_platform".into(), DataType::String),
            Field::new("reach".into(), DataType::Int64),
            Field::new("impressions".into(), DataType::Int64),
            Field::new("clicks".into(), DataType::Int64),
            Field::new("spend".into(), DataType::String),
            Field::new("ctr".into(), DataType::Float64),
            Field::new("cpc".into(), DataType::String),
            Field::new("cpm".into(), DataType::String),
            Field::new("meta_row_json".into(), DataType::String),
        ])
    }

    /// Validate DataFrame against schema
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }

    /// Convert normalized rows into a DataFrame matching [`Self::schema`].
    pub fn to_dataframe(rows: &[NormalizedRow]) -> PolarsResult<DataFrame> {
        fn strings<'a>(
            rows: &'a [NormalizedRow],
            f: impl Fn(&'a NormalizedRow) -> Option<&'a str>,
        ) -> Vec<Option<&'a str>> {
            rows.iter().map(f).collect()
        }

        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        let load_ts: Vec<i64> = rows.iter().map(|r| r.load_timestamp.timestamp_micros()).collect();
        let load_dates: Vec<i32> = rows
            .iter()
            .map(|r| (r.load_date - epoch).num_days() as i32)
            .collect();

        DataFrame::new(vec![
            Column::new("load_timestamp".into(), load_ts)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
            Column::new("load_date".into(), load_dates).cast(&DataType::Date)?,
            Column::new("date_start".into(), strings(rows, |r| r.date_start.as_deref())),
            Column::new("date_stop".into(), strings(rows, |r| r.date_stop.as_deref())),
            Column::new("account_id".into(), strings(rows, |r| r.account_id.as_deref())),
            Column::new("campaign_id".into(), strings(rows, |r| r.campaign_id.as_deref())),
            Column::new("campaign_name".into(), strings(rows, |r| r.campaign_name.as_deref())),
            Column::new("objective".into(), strings(rows, |r| r.objective.as_deref())),
            Column::new(
                "publisher_platform".into(),
                strings(rows, |r| r.publisher_platform.as_deref()),
            ),
            Column::new("reach".into(), rows.iter().map(|r| r.reach).collect::<Vec<_>>()),
            Column::new(
                "impressions".into(),
                rows.iter().map(|r| r.impressions).collect::<Vec<_>>(),
            ),
            Column::new("clicks".into(), rows.iter().map(|r| r.clicks).collect::<Vec<_>>()),
            Column::new("spend".into(), strings(rows, |r| r.spend.as_deref())),
            Column::new("ctr".into(), rows.iter().map(|r| r.ctr).collect::<Vec<_>>()),
            Column::new("cpc".into(), strings(rows, |r| r.cpc.as_deref())),
            Column::new("cpm".into(), strings(rows, |r| r.cpm.as_deref())),
            Column::new(
                "meta_row_json".into(),
                rows.iter().map(|r| r.meta_row_json.as_str()).collect::<Vec<_>>(),
            ),
        ])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
