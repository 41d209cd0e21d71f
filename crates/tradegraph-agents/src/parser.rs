use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;
use tradegraph_models::{Action, Stance};

use crate::error::AgentError;

/// Marker the trading roles end their free-text answers with.
pub const FINAL_PROPOSAL_MARKER: &str = "FINAL TRANSACTION PROPOSAL:";

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    if let Some(json_str) = extract_first_object(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                return Some(text[json_start..json_start + end].trim().to_string());
            }
        }
    }

    None
}

/// Find the first balanced { ... } in the text, ignoring braces inside strings.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// The fields a role answer may carry, before it becomes an `AgentOpinion`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpinionPayload {
    pub reasoning: String,
    pub stance: Option<Stance>,
    pub confidence: Option<Decimal>,
    pub action: Option<Action>,
    pub concedes: bool,
}

fn parse_stance(s: &str) -> Option<Stance> {
    match s.trim().to_ascii_lowercase().as_str() {
        "bullish" | "bull" | "buy" | "long" => Some(Stance::Bullish),
        "bearish" | "bear" | "sell" | "short" => Some(Stance::Bearish),
        "neutral" | "hold" => Some(Stance::Neutral),
        _ => None,
    }
}

fn parse_confidence(value: &Value) -> Option<Decimal> {
    let d = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim().trim_end_matches('%')).ok(),
        _ => None,
    }?;
    // Some models answer in percent.
    let d = if d > Decimal::ONE { d / Decimal::ONE_HUNDRED } else { d };
    Some(d.clamp(Decimal::ZERO, Decimal::ONE))
}

/// Scan free text for `FINAL TRANSACTION PROPOSAL: BUY|SELL|HOLD`. The last
/// marker wins.
pub fn scan_final_proposal(text: &str) -> Option<Action> {
    let upper = text.to_ascii_uppercase();
    upper.rmatch_indices(FINAL_PROPOSAL_MARKER).find_map(|(idx, _)| {
        let rest = upper[idx + FINAL_PROPOSAL_MARKER.len()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c == '*');
        let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        Action::from_str(&word).ok()
    })
}

/// Parse a role answer. Prefers the first JSON object; when the answer has no
/// JSON, the whole text is the reasoning and the action comes from the final
/// proposal marker, if any.
pub fn parse_opinion_payload(raw: &str) -> Result<OpinionPayload, AgentError> {
    let Ok(json_str) = extract_json(raw) else {
        let reasoning = raw.trim().to_string();
        if reasoning.is_empty() {
            return Err(AgentError::Parse("empty response".to_string()));
        }
        return Ok(OpinionPayload {
            action: scan_final_proposal(&reasoning),
            reasoning,
            stance: None,
            confidence: None,
            concedes: false,
        });
    };

    let value: Value = serde_json::from_str(&json_str)?;
    let obj = value
        .as_object()
        .ok_or_else(|| AgentError::Parse("response JSON is not an object".to_string()))?;

    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
    };

    let reasoning = text(&["reasoning", "analysis", "report", "argument", "lesson"])
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Parse(format!("missing reasoning in {json_str}")))?;

    let action = match text(&["action", "decision", "proposal"]) {
        Some(a) => Some(
            Action::from_str(&a).map_err(|e| AgentError::Parse(format!("bad action: {e}")))?,
        ),
        None => scan_final_proposal(&reasoning),
    };

    let stance = match text(&["stance"]) {
        Some(s) => Some(parse_stance(&s).ok_or_else(|| {
            AgentError::Parse(format!("bad stance {s:?}"))
        })?),
        None => None,
    };

    Ok(OpinionPayload {
        reasoning,
        stance,
        confidence: obj.get("confidence").and_then(parse_confidence),
        action,
        concedes: obj.get("concedes").and_then(Value::as_bool).unwrap_or(false),
    })
}
