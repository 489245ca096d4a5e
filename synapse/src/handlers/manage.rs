//! Built-in handlers for `manage` agents

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use super::{from_fn, parse_input, round2, HandlerError, HandlerRegistry, HandlerResult, ManageOp};

pub(crate) fn register(registry: &mut HandlerRegistry) {
    registry.register(ManageOp::DigitalCheckin, from_fn(digital_checkin));
    registry.register(ManageOp::PredictWaitTime, from_fn(predict_wait_time));
    registry.register(ManageOp::ClassifyTriage, from_fn(classify_triage));
    registry.register(ManageOp::OptimizeResources, from_fn(optimize_resources));
}

/// Minutes of service per patient per staff member
const MINUTES_PER_PATIENT: f64 = 12.0;
const MIN_WAIT_MINUTES: f64 = 5.0;
const MAX_WAIT_MINUTES: f64 = 180.0;

fn estimate_wait(queue_length: u32, staff_available: u32, rooms_available: u32) -> f64 {
    let servers = staff_available.min(rooms_available.max(1)).max(1) as f64;
    (queue_length as f64 * MINUTES_PER_PATIENT / servers).clamp(MIN_WAIT_MINUTES, MAX_WAIT_MINUTES)
}

fn wait_confidence(queue_length: u32) -> f64 {
    (1.0 - queue_length as f64 / 20.0).clamp(0.6, 0.95)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckinRequest {
    patient_id: JsonValue,
    appointment_id: Option<JsonValue>,
    #[serde(default = "default_department")]
    department: String,
    #[serde(default)]
    queue_length: u32,
    #[serde(default = "one")]
    staff_available: u32,
}

fn default_department() -> String {
    "general".to_string()
}

fn one() -> u32 {
    1
}

fn digital_checkin(input: JsonValue) -> HandlerResult {
    let req: CheckinRequest = parse_input(input)?;
    if req.patient_id.is_null() || req.patient_id.as_str().is_some_and(|s| s.trim().is_empty()) {
        return Err(HandlerError::invalid("patientId is required"));
    }

    let position = req.queue_length + 1;
    let wait = estimate_wait(position, req.staff_available, req.staff_available);

    Ok(json!({
        "checkinId": Uuid::new_v4().to_string(),
        "patientId": req.patient_id,
        "appointmentId": req.appointment_id,
        "department": req.department,
        "status": "checked_in",
        "queuePosition": position,
        "estimatedWaitMinutes": wait.round() as u32,
        "checkedInAt": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueState {
    queue_length: u32,
    #[serde(default = "one")]
    staff_available: u32,
    #[serde(default = "one")]
    rooms_available: u32,
}

fn midday() -> u32 {
    12
}

fn predict_wait_time(input: JsonValue) -> HandlerResult {
    let req: QueueState = parse_input(input)?;
    let wait = estimate_wait(req.queue_length, req.staff_available, req.rooms_available).round() as u32;

    Ok(json!({
        "predictedWaitTime": wait,
        "estimatedWaitTime": format!("{} minutes", wait),
        "queuePosition": req.queue_length,
        "confidence": round2(wait_confidence(req.queue_length)),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriageRequest {
    age: u32,
    urgency_level: u8,
    #[serde(default = "one_u8")]
    medical_complexity: u8,
    #[serde(default)]
    symptoms: Vec<String>,
    #[serde(default = "default_pain")]
    pain_level: u8,
    #[serde(default = "default_department")]
    department: String,
}

fn one_u8() -> u8 {
    1
}

fn default_pain() -> u8 {
    5
}

fn urgency_description(level: u8) -> &'static str {
    match level {
        1 => "Non-urgent",
        2 => "Low urgency",
        3 => "Medium urgency",
        4 => "High urgency",
        _ => "Emergency",
    }
}

/// Triage level 1 (non-urgent) to 5 (emergency).
///
/// The declared urgency dominates; age, complexity, pain and symptom load
/// can raise it by up to two levels.
fn classify_triage(input: JsonValue) -> HandlerResult {
    let req: TriageRequest = parse_input(input)?;
    if !(1..=5).contains(&req.urgency_level) {
        return Err(HandlerError::invalid("urgencyLevel must be between 1 and 5"));
    }
    if !(1..=5).contains(&req.medical_complexity) {
        return Err(HandlerError::invalid("medicalComplexity must be between 1 and 5"));
    }
    if req.pain_level > 10 {
        return Err(HandlerError::invalid("painLevel must be between 0 and 10"));
    }

    let mut bump = 0u8;
    if req.age >= 75 || req.age < 2 {
        bump += 1;
    }
    if req.medical_complexity >= 4 {
        bump += 1;
    }
    if req.pain_level >= 8 {
        bump += 1;
    }
    if req.symptoms.len() >= 4 {
        bump += 1;
    }
    let level = (req.urgency_level + bump.min(2)).min(5);

    let confidence = if bump == 0 { 0.9 } else { 0.9 - 0.05 * bump as f64 };

    Ok(json!({
        "urgencyLevel": level,
        "urgencyDescription": urgency_description(level),
        "recommendedDepartment": if level == 5 { "emergency".to_string() } else { req.department },
        "estimatedWaitTime": format!("{} minutes", (5 - level as u32) * 15),
        "confidence": round2(confidence),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRequest {
    queue_length: u32,
    #[serde(default = "one")]
    staff_available: u32,
    #[serde(default = "midday")]
    hour_of_day: u32,
}

fn optimize_resources(input: JsonValue) -> HandlerResult {
    let req: ResourceRequest = parse_input(input)?;
    if req.hour_of_day > 23 {
        return Err(HandlerError::invalid("hourOfDay must be between 0 and 23"));
    }

    let mut optimal_staff = (req.queue_length / 3 + 2).clamp(1, 10);
    let mut optimal_rooms = (req.queue_length / 2 + 3).clamp(1, 15);

    // Off-hours run at half capacity
    if req.hour_of_day < 9 || req.hour_of_day > 17 {
        optimal_staff = (optimal_staff / 2).max(1);
        optimal_rooms = (optimal_rooms / 2).max(1);
    }

    let efficiency = req.staff_available as f64 / optimal_staff as f64;

    let mut recommendations = vec![
        format!("Allocate {} staff members", optimal_staff),
        format!("Use {} rooms", optimal_rooms),
    ];
    if efficiency < 0.8 {
        recommendations.push("Consider increasing staff allocation".to_string());
    } else if efficiency > 1.2 {
        recommendations.push("Consider reducing staff allocation".to_string());
    }

    Ok(json!({
        "optimalStaffAllocation": optimal_staff,
        "optimalRoomAllocation": optimal_rooms,
        "currentEfficiency": round2(efficiency),
        "recommendations": recommendations,
    }))
}
