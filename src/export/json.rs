use super::ExportError;
use crate::alerts::{AlertReport, PeriodAlerts};
use serde_json::{json, Map, Value};

/// Per-period mapping from athlete id to alert record, as consumed by the dashboard
pub fn period_to_value(alerts: &PeriodAlerts) -> Result<Value, ExportError> {
    let mut athletes = Map::new();
    for (athlete_id, record) in &alerts.records {
        let value = serde_json::to_value(record)
            .map_err(|e| ExportError::SerializationError(e.to_string()))?;
        athletes.insert(athlete_id.to_string(), value);
    }
    Ok(Value::Object(athletes))
}

/// Serialize a full report, keyed by period
pub fn alerts_to_json(report: &AlertReport) -> Result<String, ExportError> {
    let mut periods = Map::new();
    for alerts in &report.periods {
        let key = serde_json::to_value(alerts.period)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| alerts.period.to_string());
        periods.insert(key, period_to_value(alerts)?);
    }

    let document = json!({
        "generated_at": report.generated_at,
        "as_of": report.as_of,
        "periods": periods,
    });

    serde_json::to_string_pretty(&document).map_err(|e| ExportError::SerializationError(e.to_string()))
}
