//! Built-in handlers for `market` agents

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use super::{from_fn, parse_input, round2, HandlerError, HandlerRegistry, HandlerResult, MarketOp};

pub(crate) fn register(registry: &mut HandlerRegistry) {
    registry.register(MarketOp::SendReminder, from_fn(send_reminder));
    registry.register(MarketOp::AnalyzeMarketTrends, from_fn(analyze_market_trends));
    registry.register(MarketOp::ForecastDemand, from_fn(forecast_demand));
}

const DEFAULT_REMINDER: &str = "You have an upcoming appointment.";
const MAX_FORECAST_PERIODS: usize = 60;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Channel {
    Sms,
    Email,
    Whatsapp,
}

impl Channel {
    fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReminderRequest {
    patient_id: JsonValue,
    channel: Channel,
    contact: String,
    message: Option<String>,
    send_at: Option<DateTime<Utc>>,
}

fn valid_email(contact: &str) -> bool {
    match contact.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    }
}

/// Digits of a phone number, if it is one
fn phone_digits(contact: &str) -> Option<String> {
    let stripped = contact.strip_prefix('+').unwrap_or(contact);
    if !stripped.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-') {
        return None;
    }
    let digits: String = stripped.chars().filter(char::is_ascii_digit).collect();
    (10..=15).contains(&digits.len()).then_some(digits)
}

fn mask_email(contact: &str) -> String {
    match contact.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

fn mask_phone(digits: &str) -> String {
    let visible = &digits[digits.len() - 4..];
    format!("{}{}", "*".repeat(digits.len() - 4), visible)
}

fn send_reminder(input: JsonValue) -> HandlerResult {
    let req: ReminderRequest = parse_input(input)?;
    if req.patient_id.is_null() {
        return Err(HandlerError::invalid("patientId is required"));
    }

    let contact = req.contact.trim();
    let recipient = match req.channel {
        Channel::Email if valid_email(contact) => mask_email(contact),
        Channel::Email => {
            return Err(HandlerError::invalid(format!("'{}' is not a valid email address", contact)));
        }
        Channel::Sms | Channel::Whatsapp => match phone_digits(contact) {
            Some(digits) => mask_phone(&digits),
            None => {
                return Err(HandlerError::invalid(format!("'{}' is not a valid phone number", contact)));
            }
        },
    };

    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REMINDER.to_string());

    Ok(json!({
        "reminderId": Uuid::new_v4().to_string(),
        "patientId": req.patient_id,
        "channel": req.channel.as_str(),
        "recipient": recipient,
        "message": message,
        "status": "queued",
        "scheduledFor": req.send_at.unwrap_or_else(Utc::now),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentSample {
    segment: String,
    region: Option<String>,
    #[serde(default)]
    market_size_millions: f64,
    #[serde(default)]
    growth_rate: f64,
    #[serde(default)]
    adoption_rate: f64,
}

#[derive(Debug, Deserialize)]
struct TrendRequest {
    samples: Vec<SegmentSample>,
    #[serde(default)]
    series: Vec<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Least-squares slope of `series` against its index
fn slope(series: &[f64]) -> f64 {
    let n = series.len() as f64;
    if series.len() < 2 {
        return 0.0;
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = series.iter().sum::<f64>() / n;
    let (num, den) = series
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    num / den
}

fn analyze_market_trends(input: JsonValue) -> HandlerResult {
    let req: TrendRequest = parse_input(input)?;
    if req.samples.is_empty() {
        return Err(HandlerError::invalid("samples must not be empty"));
    }

    let segments: BTreeSet<&str> = req.samples.iter().map(|s| s.segment.as_str()).collect();
    let regions: BTreeSet<&str> = req.samples.iter().filter_map(|s| s.region.as_deref()).collect();

    let mut by_segment: BTreeMap<&str, Vec<&SegmentSample>> = BTreeMap::new();
    for sample in &req.samples {
        by_segment.entry(sample.segment.as_str()).or_default().push(sample);
    }
    let segment_analysis: BTreeMap<&str, JsonValue> = by_segment
        .iter()
        .map(|(segment, samples)| {
            (
                *segment,
                json!({
                    "marketSizeMillions": round2(mean(samples.iter().map(|s| s.market_size_millions))),
                    "growthRate": round2(mean(samples.iter().map(|s| s.growth_rate))),
                    "adoptionRate": round2(mean(samples.iter().map(|s| s.adoption_rate))),
                }),
            )
        })
        .collect();

    let mut trends = Vec::new();
    let high_growth = req.samples.iter().filter(|s| s.growth_rate > 0.1).count();
    if high_growth > 0 {
        trends.push(format!("{} high-growth segments identified", high_growth));
    }
    let high_adoption = req.samples.iter().filter(|s| s.adoption_rate > 0.6).count();
    if high_adoption > 0 {
        trends.push(format!("{} high-adoption regions identified", high_adoption));
    }

    let series_slope = slope(&req.series);
    let direction = if req.series.len() < 2 {
        "unknown"
    } else if series_slope > 0.0 {
        "rising"
    } else if series_slope < 0.0 {
        "falling"
    } else {
        "flat"
    };

    Ok(json!({
        "marketMetrics": {
            "totalSegments": segments.len(),
            "totalRegions": regions.len(),
            "avgMarketSize": round2(mean(req.samples.iter().map(|s| s.market_size_millions))),
            "avgGrowthRate": round2(mean(req.samples.iter().map(|s| s.growth_rate))),
            "avgAdoptionRate": round2(mean(req.samples.iter().map(|s| s.adoption_rate))),
        },
        "segmentAnalysis": segment_analysis,
        "trends": trends,
        "trendDirection": direction,
        "slope": round2(series_slope),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemandRequest {
    history: Vec<f64>,
    #[serde(default = "default_periods")]
    periods: usize,
}

fn default_periods() -> usize {
    12
}

/// Demand forecast with linear growth and a yearly seasonal wave.
///
/// Growth is the relative change from the first to the last observation,
/// spread over twelve periods.
fn forecast_demand(input: JsonValue) -> HandlerResult {
    let req: DemandRequest = parse_input(input)?;
    if req.history.is_empty() {
        return Err(HandlerError::invalid("history must not be empty"));
    }
    if req.history.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(HandlerError::invalid("history values must be non-negative numbers"));
    }
    if req.periods == 0 || req.periods > MAX_FORECAST_PERIODS {
        return Err(HandlerError::invalid(format!(
            "periods must be between 1 and {}",
            MAX_FORECAST_PERIODS
        )));
    }

    let current = mean(req.history.iter().copied());
    let first = req.history[0];
    let last = req.history[req.history.len() - 1];
    let growth = if first > 0.0 { (last - first) / first } else { 0.0 };

    let forecasts: Vec<JsonValue> = (0..req.periods)
        .map(|i| {
            let growth_factor = 1.0 + growth * (i + 1) as f64 / 12.0;
            let seasonal = 1.0 + 0.1 * (2.0 * PI * i as f64 / 12.0).sin();
            let demand = current * growth_factor * seasonal;
            json!({
                "period": i + 1,
                "forecastedDemand": round2(demand),
                "growthRate": round2(growth_factor - 1.0),
                "confidenceInterval": [round2(demand * 0.9), round2(demand * 1.1)],
            })
        })
        .collect();

    Ok(json!({
        "demandMetrics": {
            "currentDemand": round2(current),
            "demandGrowth": round2(growth),
        },
        "forecasts": forecasts,
        "forecastPeriods": req.periods,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reminder_masks_recipient() {
        let out = send_reminder(json!({
            "patientId": 7, "channel": "sms", "contact": "+91 98765-43210"
        }))
        .unwrap();
        assert_eq!(out["status"], "queued");
        assert_eq!(out["recipient"], "********3210");
        assert_eq!(out["message"], DEFAULT_REMINDER);

        let out = send_reminder(json!({
            "patientId": 7, "channel": "email", "contact": "asha@clinic.in", "message": "See you"
        }))
        .unwrap();
        assert_eq!(out["recipient"], "a***@clinic.in");
        assert_eq!(out["message"], "See you");
    }

    #[test]
    fn test_reminder_rejects_bad_contact() {
        assert!(send_reminder(json!({"patientId": 1, "channel": "email", "contact": "nope"})).is_err());
        assert!(send_reminder(json!({"patientId": 1, "channel": "whatsapp", "contact": "12ab"})).is_err());
        assert!(send_reminder(json!({"patientId": 1, "channel": "pigeon", "contact": "x"})).is_err());
    }

    #[test]
    fn test_market_trends() {
        let out = analyze_market_trends(json!({
            "samples": [
                {"segment": "telehealth", "region": "north", "marketSizeMillions": 100, "growthRate": 0.2, "adoptionRate": 0.7},
                {"segment": "telehealth", "region": "south", "marketSizeMillions": 50, "growthRate": 0.1, "adoptionRate": 0.4},
                {"segment": "diagnostics", "region": "north", "marketSizeMillions": 30, "growthRate": 0.05, "adoptionRate": 0.3},
            ],
            "series": [1.0, 2.0, 3.0, 4.0]
        }))
        .unwrap();

        assert_eq!(out["marketMetrics"]["totalSegments"], json!(2));
        assert_eq!(out["marketMetrics"]["totalRegions"], json!(2));
        assert_eq!(out["segmentAnalysis"]["telehealth"]["marketSizeMillions"], json!(75.0));
        assert_eq!(out["trendDirection"], "rising");
        assert_eq!(out["slope"], json!(1.0));
        assert_eq!(out["trends"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_forecast_flat_history() {
        let out = forecast_demand(json!({"history": [100.0, 100.0], "periods": 3})).unwrap();
        let forecasts = out["forecasts"].as_array().unwrap();
        assert_eq!(forecasts.len(), 3);
        assert_eq!(forecasts[0]["forecastedDemand"], json!(100.0));
        assert_eq!(forecasts[0]["confidenceInterval"], json!([90.0, 110.0]));
        assert_eq!(forecasts[3 - 1]["period"], json!(3));
    }

    #[test]
    fn test_forecast_validation() {
        assert!(forecast_demand(json!({"history": []})).is_err());
        assert!(forecast_demand(json!({"history": [1.0], "periods": 0})).is_err());
        assert!(forecast_demand(json!({"history": [-1.0]})).is_err());
    }
}
