//! Built-in handlers for `make` agents
//!
//! Text-level processing only. Image OCR and model-backed extraction are
//! provided by registering replacement handlers.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{from_fn, parse_input, round2, HandlerError, HandlerRegistry, HandlerResult, MakeOp};

pub(crate) fn register(registry: &mut HandlerRegistry) {
    registry.register(MakeOp::OcrDocument, from_fn(ocr_document));
    registry.register(MakeOp::ExtractMedicalEntities, from_fn(extract_medical_entities));
    registry.register(MakeOp::SummarizeDocument, from_fn(summarize_document));
}

const SYMPTOMS: &[&str] = &[
    "fever", "cough", "headache", "nausea", "vomiting", "diarrhea", "fatigue", "pain",
    "swelling", "rash", "dizziness", "shortness of breath", "chest pain", "abdominal pain",
    "back pain", "joint pain",
];

const DIAGNOSES: &[&str] = &[
    "diabetes", "hypertension", "asthma", "pneumonia", "flu", "covid", "heart disease",
    "cancer", "arthritis", "depression", "anxiety",
];

const MEDICATIONS: &[&str] = &[
    "aspirin", "ibuprofen", "acetaminophen", "paracetamol", "antibiotics", "insulin",
    "metformin", "lisinopril", "amlodipine", "albuterol", "prednisone",
];

const BODY_PARTS: &[&str] = &[
    "head", "chest", "abdomen", "arm", "leg", "back", "neck", "throat", "ear", "eye", "nose",
    "mouth", "heart", "lung",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcrRequest {
    document_id: Option<JsonValue>,
    #[serde(default)]
    text: String,
}

fn classify_document(lower: &str) -> &'static str {
    if lower.contains("rx") || lower.contains("prescription") || lower.contains("dosage") {
        "prescription"
    } else if lower.contains("discharge") {
        "discharge_summary"
    } else if lower.contains("lab") || lower.contains("test result") || lower.contains("hemoglobin") {
        "lab_report"
    } else {
        "clinical_note"
    }
}

fn ocr_document(input: JsonValue) -> HandlerResult {
    let req: OcrRequest = parse_input(input)?;

    let lines: Vec<String> = req
        .text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(HandlerError::invalid("document has no text layer"));
    }

    let text = lines.join("\n");
    let word_count = text.split_whitespace().count();
    let document_type = classify_document(&text.to_lowercase());

    Ok(json!({
        "documentId": req.document_id,
        "documentType": document_type,
        "text": text,
        "lineCount": lines.len(),
        "wordCount": word_count,
    }))
}

/// Lowercased words of `text` joined by single spaces, padded at both ends
fn normalized(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}

fn find_terms(haystack: &str, terms: &[&'static str]) -> Vec<&'static str> {
    terms
        .iter()
        .copied()
        .filter(|term| haystack.contains(&format!(" {} ", term)))
        .collect()
}

#[derive(Debug, Deserialize)]
struct EntityRequest {
    text: String,
}

fn extract_medical_entities(input: JsonValue) -> HandlerResult {
    let req: EntityRequest = parse_input(input)?;
    if req.text.trim().is_empty() {
        return Err(HandlerError::invalid("text must not be empty"));
    }

    let haystack = normalized(&req.text);
    let symptoms = find_terms(&haystack, SYMPTOMS);
    let diagnoses = find_terms(&haystack, DIAGNOSES);
    let medications = find_terms(&haystack, MEDICATIONS);
    let body_parts = find_terms(&haystack, BODY_PARTS);
    let entity_count = symptoms.len() + diagnoses.len() + medications.len() + body_parts.len();

    Ok(json!({
        "entities": {
            "symptoms": symptoms,
            "diagnoses": diagnoses,
            "medications": medications,
            "bodyParts": body_parts,
        },
        "entityCount": entity_count,
        "hasMedicalEntities": entity_count > 0,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRequest {
    text: String,
    #[serde(default = "default_max_words")]
    max_words: usize,
}

fn default_max_words() -> usize {
    40
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Extractive summary: leading sentences up to the word budget
fn summarize_document(input: JsonValue) -> HandlerResult {
    let req: SummaryRequest = parse_input(input)?;
    if req.max_words == 0 {
        return Err(HandlerError::invalid("maxWords must be positive"));
    }

    let sentences = split_sentences(&req.text);
    if sentences.is_empty() {
        return Err(HandlerError::invalid("text must not be empty"));
    }
    if !req.text.split_whitespace().any(|w| w.chars().any(char::is_alphanumeric)) {
        return Err(HandlerError::invalid("text must contain words"));
    }

    let mut picked = Vec::new();
    let mut words = 0;
    for sentence in &sentences {
        let len = sentence.split_whitespace().count();
        if !picked.is_empty() && words + len > req.max_words {
            break;
        }
        picked.push(*sentence);
        words += len;
    }

    let mut summary = picked.join(" ");
    // A single leading sentence may still exceed the budget
    if words > req.max_words {
        let truncated: Vec<_> = summary.split_whitespace().take(req.max_words).collect();
        summary = format!("{}...", truncated.join(" "));
        words = req.max_words;
    }

    let original_words = req.text.split_whitespace().count();

    Ok(json!({
        "summary": summary,
        "sentenceCount": sentences.len(),
        "summaryWordCount": words,
        "originalWordCount": original_words,
        "compressionRatio": round2(words as f64 / original_words as f64),
    }))
}
