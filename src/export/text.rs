use super::ExportError;
use crate::alerts::{AlertRecord, AlertReport, PeriodAlerts};
use crate::deviation::Severity;
use std::io::{self, Write};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// One line of the terminal alert table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Athlete")]
    athlete: i64,
    #[tabled(rename = "Alert")]
    alert: String,
    #[tabled(rename = "Deviating Metrics")]
    deviating: String,
    #[tabled(rename = "No Baseline")]
    unevaluated: String,
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::None => "-".to_string(),
        other => format!("{} ({})", other, other.level()),
    }
}

fn describe_deviations(record: &AlertRecord) -> String {
    if record.deviating_metrics.is_empty() {
        return "-".to_string();
    }

    record
        .deviating_metrics
        .iter()
        .map(|d| {
            format!(
                "{} {:.1} vs {:.1} ({:.1} sd)",
                d.metric, d.value, d.avg_value, d.deviation_amount
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render one period as a terminal table, worst alerts first
pub fn alert_table(alerts: &PeriodAlerts) -> String {
    let mut records: Vec<&AlertRecord> = alerts.records.values().collect();
    records.sort_by(|a, b| b.alert.cmp(&a.alert).then(a.athlete_id.cmp(&b.athlete_id)));

    let rows: Vec<AlertRow> = records
        .into_iter()
        .map(|record| AlertRow {
            athlete: record.athlete_id,
            alert: severity_label(record.alert),
            deviating: describe_deviations(record),
            unevaluated: if record.unevaluated.is_empty() {
                "-".to_string()
            } else {
                record
                    .unevaluated
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            },
        })
        .collect();

    let mut out = format!(
        "{} (vs {} baseline): {} athletes, {} flagged\n",
        alerts.period,
        alerts.horizon,
        alerts.len(),
        alerts.flagged().count()
    );

    if rows.is_empty() {
        out.push_str("No athlete data for this period\n");
    } else {
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }
    out
}

/// Write a full report as plain text
pub fn write_text<W: Write>(out: &mut W, report: &AlertReport) -> io::Result<()> {
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "ATHLETE ALERT REPORT")?;
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "As of: {}", report.as_of.format("%Y-%m-%d"))?;
    writeln!(
        out,
        "Generated: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(out)?;

    for alerts in &report.periods {
        writeln!(out, "{} (vs {} baseline)", alerts.period.to_string().to_uppercase(), alerts.horizon)?;
        writeln!(out, "{}", "-".repeat(60))?;
        writeln!(
            out,
            "Athletes: {}  Severe: {}  Moderate: {}",
            alerts.len(),
            alerts.count_at(Severity::Severe),
            alerts.count_at(Severity::Moderate)
        )?;

        for record in alerts.flagged() {
            writeln!(out, "Athlete {}: {}", record.athlete_id, record.alert)?;
            for d in &record.deviating_metrics {
                writeln!(
                    out,
                    "  • {}: {:.1} vs baseline {:.1} ({:.2} sd, {})",
                    d.metric, d.value, d.avg_value, d.deviation_amount, d.deviation
                )?;
            }
        }

        let gaps: Vec<_> = alerts.records.values().filter(|r| r.has_data_gaps()).collect();
        if !gaps.is_empty() {
            writeln!(out, "Insufficient baseline data:")?;
            for record in gaps {
                let metrics: Vec<_> = record.unevaluated.iter().map(|m| m.to_string()).collect();
                writeln!(out, "  • Athlete {}: {}", record.athlete_id, metrics.join(", "))?;
            }
        }
        writeln!(out)?;
    }

    Ok(())
}

/// Render a full report as a plain-text string
pub fn render_text(report: &AlertReport) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_text(&mut buffer, report)?;
    String::from_utf8(buffer).map_err(|e| ExportError::SerializationError(e.to_string()))
}
