//! Structured critique parsing

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One prioritized fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// 1 is most important
    pub priority: u32,
    pub issue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Score for one rubric dimension, 1 to 5
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    pub dimension: String,
    pub score: f32,
}

/// Parsed critique of one artifact version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub verdict: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Sorted by priority
    pub fixes: Vec<Fix>,
    pub scores: Vec<RubricScore>,
}

impl Feedback {
    /// Parse a model response into feedback.
    ///
    /// The first JSON object in `text` is used, so code fences and leading
    /// prose are tolerated. A verdict, at least one fix and at least one score
    /// in `1..=5` are required.
    pub fn parse(text: &str) -> Result<Self, String> {
        let raw = extract_json_object(text).ok_or("no JSON object found in response")?;
        let value: Value =
            serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
        let obj = value.as_object().ok_or("expected a JSON object")?;

        let verdict = obj
            .get("verdict")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or("missing or empty \"verdict\"")?
            .to_string();

        let strengths = obj
            .get("strengths")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let fixes = parse_fixes(obj.get("fixes"))?;
        let scores = parse_scores(obj.get("scores"))?;

        Ok(Self {
            verdict,
            strengths,
            fixes,
            scores,
        })
    }

    /// Mean of all rubric scores
    pub fn average_score(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().map(|s| s.score).sum::<f32>() / self.scores.len() as f32
    }

    /// Human-readable rendering, used in revision prompts and saved reports
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "**Verdict:** {}\n", self.verdict);

        if !self.strengths.is_empty() {
            out.push_str("**Strengths:**\n");
            for s in &self.strengths {
                let _ = writeln!(out, "- {}", s);
            }
            out.push('\n');
        }

        out.push_str("**Most important fixes:**\n");
        for fix in &self.fixes {
            match &fix.suggestion {
                Some(suggestion) => {
                    let _ = writeln!(out, "{}. {} → {}", fix.priority, fix.issue, suggestion);
                }
                None => {
                    let _ = writeln!(out, "{}. {}", fix.priority, fix.issue);
                }
            }
        }

        out.push_str("\n**Rubric (1-5):**\n");
        for score in &self.scores {
            let _ = writeln!(out, "- {}: {}", score.dimension, score.score);
        }
        out
    }
}

fn parse_fixes(value: Option<&Value>) -> Result<Vec<Fix>, String> {
    let items = value
        .and_then(Value::as_array)
        .ok_or("missing \"fixes\" list")?;

    let mut fixes = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let position = i as u32 + 1;
        let fix = match item {
            Value::String(issue) => Fix {
                priority: position,
                issue: issue.clone(),
                suggestion: None,
            },
            Value::Object(map) => {
                let issue = map
                    .get("issue")
                    .or_else(|| map.get("problem"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("fix {} has no \"issue\"", position))?;
                Fix {
                    priority: map
                        .get("priority")
                        .and_then(Value::as_u64)
                        .map(|p| p as u32)
                        .unwrap_or(position),
                    issue: issue.to_string(),
                    suggestion: map
                        .get("suggestion")
                        .or_else(|| map.get("fix"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }
            }
            _ => return Err(format!("fix {} is neither text nor an object", position)),
        };
        if fix.issue.trim().is_empty() {
            return Err(format!("fix {} is empty", position));
        }
        fixes.push(fix);
    }

    if fixes.is_empty() {
        return Err("\"fixes\" must list at least one fix".into());
    }
    fixes.sort_by_key(|f| f.priority);
    Ok(fixes)
}

/// Scores may be a `{dimension: score}` map or a list of `{dimension, score}`.
fn parse_scores(value: Option<&Value>) -> Result<Vec<RubricScore>, String> {
    let pairs: Vec<(String, Value)> = match value {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| -> Result<(String, Value), String> {
                let dimension = item
                    .get("dimension")
                    .and_then(Value::as_str)
                    .ok_or("score entry has no \"dimension\"")?;
                let score = item.get("score").ok_or("score entry has no \"score\"")?;
                Ok((dimension.to_string(), score.clone()))
            })
            .collect::<Result<_, String>>()?,
        _ => return Err("missing \"scores\"".into()),
    };

    let mut scores = Vec::with_capacity(pairs.len());
    for (dimension, raw) in pairs {
        let score = raw
            .as_f64()
            .ok_or_else(|| format!("score for {} is not a number", dimension))?;
        if !(1.0..=5.0).contains(&score) {
            return Err(format!("score for {} is {}, expected 1-5", dimension, score));
        }
        scores.push(RubricScore {
            dimension,
            score: score as f32,
        });
    }

    if scores.is_empty() {
        return Err("\"scores\" must contain at least one dimension".into());
    }
    Ok(scores)
}

/// Locate the first balanced `{...}` in `text`, honoring JSON strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "verdict": "Accurate but too short to cover the topic.",
        "strengths": ["Clear opening"],
        "fixes": [
            {"priority": 2, "issue": "No conclusion", "suggestion": "Add a closing paragraph"},
            {"priority": 1, "issue": "Too short", "suggestion": "Explain light and dark reactions"}
        ],
        "scores": {"Structure": 3, "Clarity": 4, "Argument Strength": 2, "Style": 4, "Overall": 3}
    }"#;

    #[test]
    fn test_parse_valid_feedback() {
        let fb = Feedback::parse(VALID).unwrap();
        assert_eq!(fb.verdict, "Accurate but too short to cover the topic.");
        assert_eq!(fb.strengths, vec!["Clear opening"]);
        assert_eq!(fb.fixes[0].issue, "Too short");
        assert_eq!(fb.fixes[1].priority, 2);
        assert_eq!(fb.scores.len(), 5);
        assert!((fb.average_score() - 3.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tolerates_fences_and_prose() {
        let wrapped = format!("Here is my review:\n```json\n{}\n```\nThanks!", VALID);
        assert!(Feedback::parse(&wrapped).is_ok());
    }

    #[test]
    fn test_parse_plain_string_fixes_and_score_list() {
        let text = r#"{"verdict": "ok", "fixes": ["tighten intro", "cite sources"],
            "scores": [{"dimension": "Overall", "score": 4}]}"#;
        let fb = Feedback::parse(text).unwrap();
        assert_eq!(fb.fixes[1].priority, 2);
        assert_eq!(fb.fixes[1].issue, "cite sources");
        assert_eq!(fb.scores[0].dimension, "Overall");
    }

    #[test]
    fn test_rejects_missing_fields() {
        assert!(Feedback::parse("not json at all").is_err());
        assert!(Feedback::parse(r#"{"verdict": "", "fixes": ["x"], "scores": {"a": 3}}"#).is_err());
        assert!(Feedback::parse(r#"{"verdict": "v", "fixes": [], "scores": {"a": 3}}"#).is_err());
        assert!(Feedback::parse(r#"{"verdict": "v", "fixes": ["x"], "scores": {}}"#).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_score() {
        let err = Feedback::parse(r#"{"verdict": "v", "fixes": ["x"], "scores": {"Overall": 9}}"#)
            .unwrap_err();
        assert!(err.contains("expected 1-5"));
    }

    #[test]
    fn test_extract_json_object_ignores_braces_in_strings() {
        let text = r#"prefix {"a": "has } brace", "b": {"c": 1}} suffix {"d": 2}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": "has } brace", "b": {"c": 1}}"#)
        );
        assert_eq!(extract_json_object("{ unterminated"), None);
    }

    #[test]
    fn test_markdown_lists_fixes_in_priority_order() {
        let md = Feedback::parse(VALID).unwrap().to_markdown();
        let first = md.find("Too short").unwrap();
        let second = md.find("No conclusion").unwrap();
        assert!(first < second);
        assert!(md.contains("- Overall: 3"));
    }
}
