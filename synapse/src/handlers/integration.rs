//! Built-in handlers for `integration` agents

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{from_fn, parse_input, round2, HandlerError, HandlerRegistry, HandlerResult, IntegrationOp};

pub(crate) fn register(registry: &mut HandlerRegistry) {
    registry.register(IntegrationOp::AbhaIntegration, from_fn(abha_integration));
    registry.register(IntegrationOp::CheckCompatibility, from_fn(check_compatibility));
    registry.register(IntegrationOp::ConvertDataFormat, from_fn(convert_data_format));
}

const ABHA_DIGITS: usize = 14;
const COMPATIBILITY_THRESHOLD: f64 = 0.8;

/// Health record formats understood by the integration handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum DataFormat {
    #[serde(rename = "FHIR_R4")]
    FhirR4,
    #[serde(rename = "HL7_V2")]
    Hl7V2,
    #[serde(rename = "CDA")]
    Cda,
    #[serde(rename = "CSV")]
    Csv,
    #[serde(rename = "JSON")]
    Json,
}

impl DataFormat {
    fn as_str(&self) -> &'static str {
        match self {
            DataFormat::FhirR4 => "FHIR_R4",
            DataFormat::Hl7V2 => "HL7_V2",
            DataFormat::Cda => "CDA",
            DataFormat::Csv => "CSV",
            DataFormat::Json => "JSON",
        }
    }

    /// Conversion success rate and complexity between two formats
    fn conversion(self, target: DataFormat) -> (f64, &'static str) {
        use DataFormat::*;
        match (self, target) {
            (a, b) if a == b => (1.0, "none"),
            (Json, Csv) | (Csv, Json) => (0.95, "low"),
            (FhirR4, Json) => (0.9, "medium"),
            (Json, FhirR4) => (0.85, "high"),
            (Hl7V2, FhirR4) => (0.85, "high"),
            (Hl7V2, Json) => (0.8, "high"),
            (FhirR4, Hl7V2) => (0.8, "high"),
            (Json, Hl7V2) => (0.75, "high"),
            (Cda, FhirR4) => (0.75, "high"),
            _ => (0.7, "unknown"),
        }
    }
}

/// Digits of an ABHA number, accepting `xx-xxxx-xxxx-xxxx` or bare digits
fn abha_digits(raw: &str) -> Option<String> {
    if !raw.chars().all(|c| c.is_ascii_digit() || c == '-' || c == ' ') {
        return None;
    }
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == ABHA_DIGITS).then_some(digits)
}

fn format_abha(digits: &str) -> String {
    format!("{}-{}-{}-{}", &digits[..2], &digits[2..6], &digits[6..10], &digits[10..])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbhaRequest {
    abha_id: String,
    patient_id: Option<JsonValue>,
    abha_address: Option<String>,
    #[serde(default)]
    consent_granted: bool,
}

fn abha_integration(input: JsonValue) -> HandlerResult {
    let req: AbhaRequest = parse_input(input)?;

    let digits = abha_digits(req.abha_id.trim()).ok_or_else(|| {
        HandlerError::invalid(format!("abhaId must contain exactly {} digits", ABHA_DIGITS))
    })?;
    if let Some(address) = req.abha_address.as_deref() {
        let valid = address
            .split_once('@')
            .is_some_and(|(handle, domain)| !handle.is_empty() && !domain.is_empty());
        if !valid {
            return Err(HandlerError::invalid("abhaAddress must look like handle@domain"));
        }
    }
    if !req.consent_granted {
        return Err(HandlerError::failed("patient consent is required to link an ABHA record"));
    }

    Ok(json!({
        "abhaNumber": format_abha(&digits),
        "abhaAddress": req.abha_address,
        "patientId": req.patient_id,
        "status": "linked",
        "linkedAt": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompatibilityRequest {
    source_format: DataFormat,
    target_format: DataFormat,
    protocol_type: Option<String>,
    data_format: Option<String>,
    encryption_level: Option<String>,
    authentication_type: Option<String>,
}

fn is_none_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("none"))
}

fn check_compatibility(input: JsonValue) -> HandlerResult {
    let req: CompatibilityRequest = parse_input(input)?;

    let (base, complexity) = req.source_format.conversion(req.target_format);
    let no_encryption = is_none_value(req.encryption_level.as_deref());
    let no_auth = is_none_value(req.authentication_type.as_deref());

    let mut issues = Vec::new();
    if req.protocol_type.as_deref() == Some("HL7") && req.data_format.as_deref() == Some("JSON") {
        issues.push("HL7 protocol typically uses XML format");
    }
    if no_encryption {
        issues.push("No encryption may pose security risks");
    }
    if no_auth {
        issues.push("No authentication may pose security risks");
    }

    let score = (base - 0.1 * issues.len() as f64).max(0.0);
    let compatible = score >= COMPATIBILITY_THRESHOLD;

    let mut recommendations = Vec::new();
    if !compatible {
        recommendations.push("Consider protocol standardization");
        recommendations.push("Implement data format conversion layer");
    }
    if no_encryption {
        recommendations.push("Implement SSL/TLS encryption");
    }
    if no_auth {
        recommendations.push("Implement OAuth2 authentication");
    }

    Ok(json!({
        "sourceFormat": req.source_format.as_str(),
        "targetFormat": req.target_format.as_str(),
        "compatibilityScore": round2(score),
        "isCompatible": compatible,
        "complexity": complexity,
        "issues": issues,
        "recommendations": recommendations,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientRecord {
    patient_id: String,
    first_name: String,
    last_name: String,
    gender: Option<String>,
    birth_date: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversionRequest {
    target_format: DataFormat,
    record: PatientRecord,
}

fn fhir_gender(gender: Option<&str>) -> &'static str {
    match gender.map(str::to_ascii_lowercase).as_deref() {
        Some("male" | "m") => "male",
        Some("female" | "f") => "female",
        Some("other" | "o") => "other",
        _ => "unknown",
    }
}

fn hl7_gender(gender: Option<&str>) -> &'static str {
    match fhir_gender(gender) {
        "male" => "M",
        "female" => "F",
        "other" => "O",
        _ => "U",
    }
}

/// Strip HL7 v2 delimiters from a field value
fn hl7_escape(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '|' | '^' | '~' | '\\' | '&')).collect()
}

fn to_fhir(record: &PatientRecord, birth_date: Option<NaiveDate>) -> JsonValue {
    let mut patient = json!({
        "resourceType": "Patient",
        "id": record.patient_id,
        "name": [{"family": record.last_name, "given": [record.first_name]}],
        "gender": fhir_gender(record.gender.as_deref()),
    });
    if let Some(date) = birth_date {
        patient["birthDate"] = json!(date.format("%Y-%m-%d").to_string());
    }
    if let Some(phone) = &record.phone {
        patient["telecom"] = json!([{"system": "phone", "value": phone}]);
    }
    patient
}

fn to_hl7_pid(record: &PatientRecord, birth_date: Option<NaiveDate>) -> String {
    let dob = birth_date
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_default();
    format!(
        "PID|1||{}||{}^{}||{}|{}|||||{}",
        hl7_escape(&record.patient_id),
        hl7_escape(&record.last_name),
        hl7_escape(&record.first_name),
        dob,
        hl7_gender(record.gender.as_deref()),
        record.phone.as_deref().map(hl7_escape).unwrap_or_default(),
    )
}

fn convert_data_format(input: JsonValue) -> HandlerResult {
    let req: ConversionRequest = parse_input(input)?;
    let record = &req.record;
    if record.patient_id.trim().is_empty() {
        return Err(HandlerError::invalid("record.patientId must not be empty"));
    }

    let birth_date = record
        .birth_date
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| HandlerError::invalid(format!("birthDate '{}' is not YYYY-MM-DD", raw)))
        })
        .transpose()?;

    let converted = match req.target_format {
        DataFormat::FhirR4 => to_fhir(record, birth_date),
        DataFormat::Hl7V2 => JsonValue::String(to_hl7_pid(record, birth_date)),
        other => {
            return Err(HandlerError::invalid(format!(
                "conversion to {} is not supported, expected FHIR_R4 or HL7_V2",
                other.as_str()
            )));
        }
    };

    Ok(json!({
        "targetFormat": req.target_format.as_str(),
        "converted": converted,
    }))
}
