use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::RiskSeverity;

/// One category-labeled pattern in the scan table.
pub struct RiskPattern {
    pub kind: &'static str,
    pub regex: Regex,
}

fn pattern(kind: &'static str, source: &str) -> RiskPattern {
    RiskPattern {
        kind,
        regex: Regex::new(source).expect("valid risk pattern"),
    }
}

/// Ordered scan table. Each pattern covers both the request phrasing
/// ("what is your card number") and, where one exists, the literal value
/// shape. Kept as data so severities and patterns stay testable apart
/// from the scanning loop.
pub static RISK_PATTERNS: Lazy<Vec<RiskPattern>> = Lazy::new(|| {
    vec![
        pattern(
            "phone_number",
            r"(?i)(?:phone|mobile|cell)\s*(?:number|#|no\b)",
        ),
        pattern(
            "email",
            r"(?i)(?:email|e-mail)\s*(?:address|addy)|[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        ),
        pattern(
            "address",
            r"(?i)(?:home|billing|shipping|street|mailing)\s*address",
        ),
        pattern(
            "credit_card",
            r"(?i)credit\s*card|debit\s*card|card\s*number|\b(?:\d[ -]?){13,16}\b",
        ),
        pattern(
            "ssn",
            r"(?i)\bssn\b|social\s*security(?:\s*number)?|\b\d{3}-\d{2}-\d{4}\b",
        ),
        pattern(
            "birth_date",
            r"(?i)date\s*of\s*birth|birthday|\bdob\b",
        ),
        pattern(
            "id_document",
            r"(?i)passport|drivers?\s*licen[cs]e|id\s*(?:number|card|document)",
        ),
        pattern(
            "bank_account",
            r"(?i)bank\s*account|routing\s*number|account\s*number|\biban\b",
        ),
        pattern(
            "security_question",
            r"(?i)mothers?\s*maiden\s*name|security\s*question",
        ),
        pattern(
            "income",
            r"(?i)\bincome\b|\bsalary\b|annual\s*earnings",
        ),
        pattern(
            "name",
            r"(?i)(?:your|full|first|last|legal)\s*name",
        ),
        pattern(
            "age",
            r"(?i)(?:your|what)\s*age\b|how\s*old\s*are\s*you",
        ),
        pattern(
            "location",
            r"(?i)(?:your|current)\s*(?:location|city|country)|zip\s*code|postal\s*code",
        ),
        pattern(
            "employer",
            r"(?i)\bemployer\b|\boccupation\b|job\s*title|place\s*of\s*work",
        ),
    ]
});

/// Static per-type sensitivity, independent of match confidence. Anything
/// not listed (including analyzer-reported types we have no table entry
/// for) ranks low.
pub fn severity_for(kind: &str) -> RiskSeverity {
    match kind {
        "ssn" | "credit_card" | "bank_account" | "passport" | "drivers_license" => {
            RiskSeverity::VeryHigh
        }
        "phone_number" | "address" | "id_document" | "email" | "birth_date"
        | "identity_verification" => RiskSeverity::High,
        "name" | "age" | "location" | "city" | "country" | "zip_code" | "postal_code"
        | "employer" | "occupation" | "account_confirmation" => RiskSeverity::Medium,
        _ => RiskSeverity::Low,
    }
}
