use crate::domain::{Confidence, RiskEntry, RiskSeverity};
use crate::risk::patterns::{severity_for, RISK_PATTERNS};

/// Scans text against the pattern table plus the two context rules.
///
/// Stateless and infallible: the same input always yields the same list,
/// and text that matches nothing yields an empty one.
pub fn scan(text: &str) -> Vec<RiskEntry> {
    let mut risks = Vec::new();
    if text.is_empty() {
        return risks;
    }

    for pattern in RISK_PATTERNS.iter() {
        if let Some(found) = pattern.regex.find(text) {
            risks.push(RiskEntry {
                kind: pattern.kind.to_string(),
                matched_text: found.as_str().to_string(),
                confidence: confidence_for(found.as_str().len(), text.len()),
                severity: severity_for(pattern.kind),
            });
        }
    }

    // Context rules catch paraphrased requests the literal patterns miss.
    let lower = text.to_lowercase();
    if lower.contains("verify") && lower.contains("identity") {
        risks.push(context_entry("identity_verification", "verify + identity"));
    }
    if lower.contains("confirm") && lower.contains("account") {
        risks.push(context_entry("account_confirmation", "confirm + account"));
    }

    risks
}

fn context_entry(kind: &str, matched: &str) -> RiskEntry {
    RiskEntry {
        kind: kind.to_string(),
        matched_text: matched.to_string(),
        confidence: Confidence::Medium,
        severity: severity_for(kind),
    }
}

/// Confidence from the fraction of the message the match occupies, so a
/// message that is substantially about the sensitive field outranks an
/// incidental mention, whatever the pattern.
fn confidence_for(match_len: usize, text_len: usize) -> Confidence {
    if text_len == 0 {
        return Confidence::Low;
    }
    let fraction = match_len as f32 / text_len as f32;
    if fraction >= 0.30 {
        Confidence::VeryHigh
    } else if fraction >= 0.15 {
        Confidence::High
    } else if fraction >= 0.05 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Overall message level: the high-water mark over the matched entries,
/// never an average or a count.
pub fn overall_level(risks: &[RiskEntry]) -> Option<RiskSeverity> {
    risks.iter().map(|r| r.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssn_disclosure_yields_one_very_high_entry() {
        let risks = scan("My SSN is 123-45-6789");
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].kind, "ssn");
        assert_eq!(risks[0].severity, RiskSeverity::VeryHigh);
        assert_eq!(risks[0].matched_text, "SSN");
    }

    #[test]
    fn clean_text_yields_no_risks() {
        assert!(scan("").is_empty());
        assert!(scan("what time do you open tomorrow?").is_empty());
    }

    #[test]
    fn scan_is_deterministic_and_never_panics_on_odd_input() {
        let odd = "ßẞ \u{202e}ssn\u{202c} 電話番号 \0";
        let first = scan(odd);
        let second = scan(odd);
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn context_rule_catches_paraphrased_identity_checks() {
        let risks = scan("To continue we need to verify your identity");
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].kind, "identity_verification");
        assert_eq!(risks[0].severity, RiskSeverity::High);
    }

    #[test]
    fn context_rule_catches_account_confirmation() {
        let risks = scan("Please confirm the account belongs to you");
        assert!(risks
            .iter()
            .any(|r| r.kind == "account_confirmation" && r.severity == RiskSeverity::Medium));
    }

    #[test]
    fn overall_level_is_the_high_water_mark() {
        let risks = scan("Please give me your full name and your credit card number");
        assert!(risks.iter().any(|r| r.kind == "name"));
        assert!(risks.iter().any(|r| r.kind == "credit_card"));
        assert_eq!(overall_level(&risks), Some(RiskSeverity::VeryHigh));
    }

    #[test]
    fn overall_level_of_nothing_is_none() {
        assert_eq!(overall_level(&[]), None);
    }

    #[test]
    fn confidence_grows_with_coverage() {
        // Same pattern, shrinking message: the fraction covered grows and
        // confidence must never decrease.
        let long = scan("could you possibly at some point share your phone number with us please")
            .remove(0);
        let short = scan("your phone number?").remove(0);
        assert_eq!(long.kind, "phone_number");
        assert_eq!(short.kind, "phone_number");
        assert!(short.confidence >= long.confidence);
        assert_eq!(short.confidence, Confidence::VeryHigh);
    }

    #[test]
    fn confidence_tiers_follow_the_fraction_thresholds() {
        assert_eq!(confidence_for(30, 100), Confidence::VeryHigh);
        assert_eq!(confidence_for(15, 100), Confidence::High);
        assert_eq!(confidence_for(5, 100), Confidence::Medium);
        assert_eq!(confidence_for(4, 100), Confidence::Low);
        assert_eq!(confidence_for(1, 0), Confidence::Low);
    }
}
