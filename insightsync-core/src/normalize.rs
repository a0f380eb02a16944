//! Raw record → fixed-schema row.
//!
//! Every column has its own coercion rule; a value that cannot be coerced
//! becomes null rather than an error. The raw record is always kept verbatim
//! in `meta_row_json`.

use crate::insights::RawRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the destination table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub load_timestamp: DateTime<Utc>,
    pub load_date: NaiveDate,
    pub date_start: Option<String>,
    pub date_stop: Option<String>,
    pub account_id: Option<String>,
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    pub objective: Option<String>,
    pub publisher_platform: Option<String>,
    pub reach: Option<i64>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    /// Decimal kept as text so an exact numeric column receives it unrounded.
    pub spend: Option<String>,
    pub ctr: Option<f64>,
    pub cpc: Option<String>,
    pub cpm: Option<String>,
    pub meta_row_json: String,
}

// ── Column coercions ────────────────────────────────────────────────

fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Integer column: parsed as floating point, then truncated toward zero.
pub fn coerce_int(v: Option<&Value>) -> Option<i64> {
    if is_blank(v) {
        return None;
    }
    let v = v?;
    if let Value::Number(n) = v {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    let f = as_f64(v)?.trunc();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Float column.
pub fn coerce_float(v: Option<&Value>) -> Option<f64> {
    if is_blank(v) {
        return None;
    }
    as_f64(v?).filter(|f| f.is_finite())
}

/// String column: non-string values use their JSON text; `""` is null.
pub fn coerce_str(v: Option<&Value>) -> Option<String> {
    let s = match v? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (!s.is_empty()).then_some(s)
}

/// Date column: passed through as sent, `""` included, so the table's own
/// date check decides. Only absent and null become null.
pub fn coerce_date(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Decimal column: the original textual form, never routed through `f64`.
pub fn coerce_decimal(v: Option<&Value>) -> Option<String> {
    coerce_str(v)
}

// ── Row mapping ─────────────────────────────────────────────────────

/// Map one raw record, stamping it with the run's ingestion instant.
pub fn normalize_record(raw: &RawRecord, load_timestamp: DateTime<Utc>) -> NormalizedRow {
    let get = |key: &str| raw.get(key);

    NormalizedRow {
        load_timestamp,
        load_date: load_timestamp.date_naive(),
        date_start: coerce_date(get("date_start")),
        date_stop: coerce_date(get("date_stop")),
        account_id: coerce_str(get("account_id")),
        campaign_id: coerce_str(get("campaign_id")),
        campaign_name: coerce_str(get("campaign_name")),
        objective: coerce_str(get("objective")),
        publisher_platform: coerce_str(get("publisher_platform")),
        reach: coerce_int(get("reach")),
        impressions: coerce_int(get("impressions")),
        clicks: coerce_int(get("clicks")),
        spend: coerce_decimal(get("spend")),
        ctr: coerce_float(get("ctr")),
        cpc: coerce_decimal(get("cpc")),
        cpm: coerce_decimal(get("cpm")),
        meta_row_json: Value::Object(raw.clone()).to_string(),
    }
}

/// Normalize a fetched page set. One row per record, order preserved.
pub fn normalize(records: &[RawRecord], load_timestamp: DateTime<Utc>) -> Vec<NormalizedRow> {
    records
        .iter()
        .map(|r| normalize_record(r, load_timestamp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(v: Value) -> RawRecord {
        match v {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn mixed_record_coerces_per_column() {
        let raw = record(json!({
            "reach": "1500",
            "spend": "12.50",
            "ctr": "",
            "campaign_name": null
        }));
        let row = normalize_record(&raw, ts());

        assert_eq!(row.reach, Some(1500));
        assert_eq!(row.spend.as_deref(), Some("12.50"));
        assert_eq!(row.ctr, None);
        assert_eq!(row.campaign_name, None);
        assert_eq!(row.impressions, None);
        assert_eq!(row.publisher_platform, None);
    }

    #[test]
    fn dates_pass_through_unchanged() {
        assert_eq!(coerce_date(Some(&json!("2024-06-01"))).as_deref(), Some("2024-06-01"));
        assert_eq!(coerce_date(Some(&json!(""))).as_deref(), Some(""));
        assert_eq!(coerce_date(Some(&json!(20240601))).as_deref(), Some("20240601"));
        assert_eq!(coerce_date(Some(&Value::Null)), None);
        assert_eq!(coerce_date(None), None);

        let row = normalize_record(&record(json!({"date_start": "", "date_stop": null})), ts());
        assert_eq!(row.date_start.as_deref(), Some(""));
        assert_eq!(row.date_stop, None);
    }

    #[test]
    fn integers_truncate_parsed_floats() {
        assert_eq!(coerce_int(Some(&json!("12.9"))), Some(12));
        assert_eq!(coerce_int(Some(&json!("-3.7"))), Some(-3));
        assert_eq!(coerce_int(Some(&json!(42))), Some(42));
        assert_eq!(coerce_int(Some(&json!(42.99))), Some(42));
        assert_eq!(coerce_int(Some(&json!("1e3"))), Some(1000));
        assert_eq!(coerce_int(Some(&json!(" 7 "))), Some(7));
    }

    #[test]
    fn integer_failures_become_null() {
        assert_eq!(coerce_int(None), None);
        assert_eq!(coerce_int(Some(&Value::Null)), None);
        assert_eq!(coerce_int(Some(&json!(""))), None);
        assert_eq!(coerce_int(Some(&json!("n/a"))), None);
        assert_eq!(coerce_int(Some(&json!("inf"))), None);
        assert_eq!(coerce_int(Some(&json!("NaN"))), None);
        assert_eq!(coerce_int(Some(&json!("1e30"))), None);
        assert_eq!(coerce_int(Some(&json!([1]))), None);
        assert_eq!(coerce_int(Some(&json!({"v": 1}))), None);
    }

    #[test]
    fn booleans_count_as_numbers() {
        assert_eq!(coerce_int(Some(&json!(true))), Some(1));
        assert_eq!(coerce_float(Some(&json!(false))), Some(0.0));
    }

    #[test]
    fn floats_parse_or_null() {
        assert_eq!(coerce_float(Some(&json!("1.2345"))), Some(1.2345));
        assert_eq!(coerce_float(Some(&json!(0.5))), Some(0.5));
        assert_eq!(coerce_float(Some(&json!("abc"))), None);
        assert_eq!(coerce_float(Some(&json!("inf"))), None);
        assert_eq!(coerce_float(None), None);
    }

    #[test]
    fn decimals_keep_textual_form() {
        assert_eq!(
            coerce_decimal(Some(&json!("0.100000000000000005551"))).as_deref(),
            Some("0.100000000000000005551")
        );
        assert_eq!(coerce_decimal(Some(&json!(12.5))).as_deref(), Some("12.5"));
        assert_eq!(coerce_decimal(Some(&json!(""))), None);
        assert_eq!(coerce_decimal(None), None);
    }

    #[test]
    fn strings_treat_empty_as_null() {
        assert_eq!(coerce_str(Some(&json!(""))), None);
        assert_eq!(coerce_str(Some(&json!("facebook"))).as_deref(), Some("facebook"));
        assert_eq!(coerce_str(Some(&json!(123456789))).as_deref(), Some("123456789"));
        assert_eq!(coerce_str(Some(&Value::Null)), None);
    }

    #[test]
    fn audit_column_preserves_raw_record() {
        let raw = record(json!({
            "spend": "1.00",
            "unexpected": {"nested": [1, 2]},
            "reach": "oops"
        }));
        let row = normalize_record(&raw, ts());
        assert_eq!(row.reach, None);

        let back: Value = serde_json::from_str(&row.meta_row_json).unwrap();
        assert_eq!(back, Value::Object(raw));
        assert!(row.meta_row_json.starts_with(r#"{"spend""#));
    }

    #[test]
    fn load_metadata_shared_across_rows() {
        let records = vec![
            record(json!({"campaign_id": "1"})),
            record(json!({"campaign_id": "2"})),
            record(json!({"campaign_id": "3"})),
        ];
        let rows = normalize(&records, ts());

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.load_timestamp == ts()));
        assert!(rows
            .iter()
            .all(|r| r.load_date == NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()));
        let ids: Vec<_> = rows.iter().map(|r| r.campaign_id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(normalize(&[], ts()).is_empty());
    }
}
