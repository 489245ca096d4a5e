//! Built-in handlers for `insights` agents

use std::collections::BTreeMap;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{from_fn, parse_input, round2, HandlerError, HandlerRegistry, HandlerResult, InsightsOp};

pub(crate) fn register(registry: &mut HandlerRegistry) {
    registry.register(InsightsOp::GenerateDashboard, from_fn(generate_dashboard));
    registry.register(InsightsOp::PredictClinicalOutcomes, from_fn(predict_clinical_outcomes));
    registry.register(InsightsOp::AnalyzeResourceUtilization, from_fn(analyze_resource_utilization));
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardRequest {
    hospital_id: Option<JsonValue>,
    #[serde(default = "default_date_range")]
    date_range: String,
    #[serde(default)]
    visits: Vec<VisitSample>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitSample {
    department: String,
    #[serde(default)]
    wait_minutes: f64,
    satisfaction: Option<f64>,
    #[serde(default)]
    readmitted: bool,
}

fn default_date_range() -> String {
    "last_30_days".to_string()
}

fn range_days(range: &str) -> Option<i64> {
    match range {
        "today" => Some(1),
        "last_7_days" => Some(7),
        "last_30_days" => Some(30),
        "last_90_days" => Some(90),
        "last_year" => Some(365),
        _ => None,
    }
}

/// Dashboard for one hospital over a named period.
///
/// KPIs are aggregated from the visit samples supplied with the request;
/// without samples every KPI reads zero and the widget layout is unchanged.
fn generate_dashboard(input: JsonValue) -> HandlerResult {
    let req: DashboardRequest = parse_input(input)?;

    let hospital_id = match req.hospital_id {
        Some(id) if !id.is_null() => id,
        _ => return Err(HandlerError::invalid("hospitalId is required")),
    };
    let days = range_days(&req.date_range).ok_or_else(|| {
        HandlerError::invalid(format!(
            "unsupported dateRange '{}', expected today, last_7_days, last_30_days, last_90_days or last_year",
            req.date_range
        ))
    })?;

    let end = Utc::now().date_naive();
    let start = end - ChronoDuration::days(days - 1);

    let total = req.visits.len();
    let avg_wait = if total > 0 {
        req.visits.iter().map(|v| v.wait_minutes).sum::<f64>() / total as f64
    } else {
        0.0
    };
    let rated: Vec<f64> = req.visits.iter().filter_map(|v| v.satisfaction).collect();
    let avg_satisfaction = if rated.is_empty() {
        None
    } else {
        Some(rated.iter().sum::<f64>() / rated.len() as f64)
    };
    let readmission_rate = if total > 0 {
        req.visits.iter().filter(|v| v.readmitted).count() as f64 / total as f64
    } else {
        0.0
    };

    let mut by_department: BTreeMap<&str, usize> = BTreeMap::new();
    for visit in &req.visits {
        *by_department.entry(visit.department.as_str()).or_insert(0) += 1;
    }
    let department_series: Vec<JsonValue> = by_department
        .iter()
        .map(|(department, visits)| json!({"department": department, "visits": visits}))
        .collect();

    let mut alerts = Vec::new();
    if avg_wait > 60.0 {
        alerts.push("URGENT: Reduce patient wait times");
    }
    if readmission_rate > 0.1 {
        alerts.push("HIGH: Implement readmission prevention program");
    }
    if avg_satisfaction.is_some_and(|s| s < 4.0) {
        alerts.push("MEDIUM: Improve patient satisfaction scores");
    }

    Ok(json!({
        "hospitalId": hospital_id,
        "dateRange": req.date_range,
        "period": {
            "start": start.to_string(),
            "end": end.to_string(),
            "days": days,
        },
        "summary": {
            "totalVisits": total,
            "avgWaitMinutes": round2(avg_wait),
            "avgSatisfaction": avg_satisfaction.map(round2),
            "readmissionRate": round2(readmission_rate),
        },
        "widgets": [
            {"id": "patient_volume", "kind": "counter", "value": total},
            {"id": "avg_wait_time", "kind": "gauge", "value": round2(avg_wait), "unit": "minutes"},
            {"id": "satisfaction", "kind": "gauge", "value": avg_satisfaction.map(round2), "max": 5.0},
            {"id": "readmission_rate", "kind": "percentage", "value": round2(readmission_rate * 100.0)},
            {"id": "department_breakdown", "kind": "bar", "series": department_series},
        ],
        "alerts": alerts,
        "generatedAt": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeRequest {
    age: u32,
    #[serde(default)]
    severity_score: f64,
    #[serde(default)]
    readmission_risk: f64,
    #[serde(default)]
    length_of_stay: f64,
}

fn predict_clinical_outcomes(input: JsonValue) -> HandlerResult {
    let req: OutcomeRequest = parse_input(input)?;

    let mut risk_factors = Vec::new();
    if req.age > 65 {
        risk_factors.push("Advanced age");
    }
    if req.severity_score > 7.0 {
        risk_factors.push("High severity score");
    }
    if req.readmission_risk > 0.5 {
        risk_factors.push("High readmission risk");
    }
    if req.length_of_stay > 7.0 {
        risk_factors.push("Extended length of stay");
    }

    let (risk_level, outcome, recommendations) = match risk_factors.len() {
        0 => (
            "low",
            "recovered",
            vec![
                "Plan for discharge",
                "Schedule follow-up appointment",
                "Provide discharge instructions",
            ],
        ),
        1 | 2 => ("moderate", "improved", vec!["Continue current treatment plan"]),
        _ => (
            "high",
            "deteriorated",
            vec![
                "Increase monitoring frequency",
                "Consider specialist consultation",
                "Review treatment plan",
            ],
        ),
    };

    Ok(json!({
        "predictedOutcome": outcome,
        "riskLevel": risk_level,
        "riskFactors": risk_factors,
        "recommendations": recommendations,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UtilizationRequest {
    bed_occupancy: f64,
    #[serde(default)]
    avg_wait_time: f64,
    avg_satisfaction: Option<f64>,
}

fn analyze_resource_utilization(input: JsonValue) -> HandlerResult {
    let req: UtilizationRequest = parse_input(input)?;
    if !(0.0..=1.0).contains(&req.bed_occupancy) {
        return Err(HandlerError::invalid("bedOccupancy must be between 0 and 1"));
    }

    let status = if req.bed_occupancy > 0.9 {
        "over_capacity"
    } else if req.bed_occupancy > 0.8 {
        "high"
    } else {
        "normal"
    };

    let mut recommendations = Vec::new();
    if req.bed_occupancy > 0.8 {
        recommendations.push("Consider adding bed capacity");
    }
    if req.avg_wait_time > 60.0 {
        recommendations.push("Optimize patient scheduling");
    }
    if req.avg_satisfaction.is_some_and(|s| s < 4.0) {
        recommendations.push("Improve patient experience initiatives");
    }

    Ok(json!({
        "utilizationMetrics": {
            "bedOccupancy": round2(req.bed_occupancy),
            "avgWaitTime": round2(req.avg_wait_time),
            "avgSatisfaction": req.avg_satisfaction.map(round2),
        },
        "status": status,
        "recommendations": recommendations,
    }))
}
