use anyhow::{Context, Result};
use reqwest::Response;
use serde::{Deserialize, Serialize};

use crate::domain::RiskSeverity;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const ANALYSIS_PROMPT: &str = r#"Analyze this AI bot message for potential privacy risks.

Look for:
1. Requests for personal information
2. Financial information requests
3. Identity document requests
4. Sensitive data collection
5. Social engineering attempts

Respond with JSON format:
{
  "risk_level": "low|medium|high",
  "risks": ["risk_type1", "risk_type2"],
  "explanation": "brief explanation",
  "recommendation": "what user should do"
}"#;

pub fn build_request(message_text: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: format!("{ANALYSIS_PROMPT}\n\nMessage: \"{message_text}\""),
            }],
        }],
    }
}

pub async fn parse_response(response: Response) -> Result<RiskAnalysis> {
    let completion: GenerateContentResponse = response.json().await?;
    let candidate = completion
        .candidates
        .into_iter()
        .next()
        .context("Gemini response did not contain any candidates")?;

    let text = candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .context("Gemini response missing candidate text")?;

    parse_analysis(&text)
}

/// Parses the model's JSON verdict, tolerating markdown code fences around it.
pub fn parse_analysis(text: &str) -> Result<RiskAnalysis> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let analysis: RiskAnalysis =
        serde_json::from_str(trimmed).context("Gemini verdict was not valid JSON")?;
    Ok(analysis)
}

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RiskAnalysis {
    pub risk_level: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

impl RiskAnalysis {
    /// Only medium and high verdicts are worth a synthesized warning.
    pub fn severity(&self) -> Option<RiskSeverity> {
        match self.risk_level.as_str() {
            "high" => Some(RiskSeverity::High),
            "medium" => Some(RiskSeverity::Medium),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_prompt_and_message() {
        let request = build_request("please share your card number");
        let text = &request.contents[0].parts[0].text;
        assert!(text.contains("privacy risks"));
        assert!(text.contains("please share your card number"));
    }

    #[test]
    fn verdict_parses_with_and_without_code_fences() {
        let bare = r#"{"risk_level":"high","risks":["credit_card"],"explanation":"asks for card"}"#;
        let fenced = format!("```json\n{bare}\n```");

        for text in [bare.to_string(), fenced] {
            let analysis = parse_analysis(&text).unwrap();
            assert_eq!(analysis.risk_level, "high");
            assert_eq!(analysis.risks, vec!["credit_card"]);
            assert_eq!(analysis.severity(), Some(RiskSeverity::High));
        }
    }

    #[test]
    fn low_verdicts_produce_no_severity() {
        let analysis = parse_analysis(r#"{"risk_level":"low"}"#).unwrap();
        assert_eq!(analysis.severity(), None);
        assert!(parse_analysis("not json at all").is_err());
    }
}
