//! Contract for the external recommendation advisor, plus a client that runs it as a child
//! process and reads a JSON reply from stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_PROMPT: &str = "관심 키워드를 고려한 맞춤 추천";

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor command is not configured")]
    NotConfigured,
    #[error("spawning advisor {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("advisor exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("advisor timed out after {0:?}")]
    Timeout(Duration),
    #[error("advisor reply is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorRequest {
    pub user_id: String,
    pub prompt: String,
}

impl AdvisorRequest {
    pub fn new(user_id: impl Into<String>, prompt: Option<String>) -> Self {
        let prompt = prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());
        Self {
            user_id: user_id.into(),
            prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub id: i64,
    pub name: String,
    pub reason: Option<String>,
    pub badges: Vec<String>,
}

/// What the advisor answered: fully formed recommendations, or policy names that still
/// have to be looked up in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvisorReply {
    Structured(Vec<Recommendation>),
    Names(Vec<String>),
}

impl AdvisorReply {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Structured(items) => items.is_empty(),
            Self::Names(names) => names.is_empty(),
        }
    }
}

/// Interpret advisor stdout.
///
/// A non-array reply is treated as no recommendations. When the first element is an
/// object carrying an integer `id`, every element is read as a structured recommendation.
/// Otherwise each element contributes a name: a string as-is, an object through `plcyNm`,
/// then `name`, then its first string value.
pub fn parse_advisor_output(stdout: &str) -> Result<AdvisorReply, AdvisorError> {
    let value: JsonValue = serde_json::from_str(stdout.trim())?;
    let JsonValue::Array(items) = value else {
        return Ok(AdvisorReply::Names(Vec::new()));
    };

    let structured = items
        .first()
        .and_then(|first| first.get("id"))
        .and_then(JsonValue::as_i64)
        .is_some();
    if structured {
        return Ok(AdvisorReply::Structured(
            items.iter().filter_map(structured_item).collect(),
        ));
    }

    Ok(AdvisorReply::Names(
        items
            .iter()
            .filter_map(item_name)
            .filter(|name| !name.is_empty())
            .collect(),
    ))
}

fn structured_item(item: &JsonValue) -> Option<Recommendation> {
    let id = item.get("id")?.as_i64()?;
    let name = ["plcyNm", "name"]
        .iter()
        .find_map(|key| item.get(*key).and_then(JsonValue::as_str))
        .unwrap_or_default()
        .to_string();
    let reason = item
        .get("reason")
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    let badges = item
        .get("badges")
        .and_then(JsonValue::as_array)
        .map(|badges| {
            badges
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(Recommendation {
        id,
        name,
        reason,
        badges,
    })
}

fn item_name(item: &JsonValue) -> Option<String> {
    match item {
        JsonValue::String(name) => Some(name.trim().to_string()),
        JsonValue::Object(map) => map
            .get("plcyNm")
            .or_else(|| map.get("name"))
            .and_then(JsonValue::as_str)
            .or_else(|| map.values().find_map(JsonValue::as_str))
            .map(|name| name.trim().to_string()),
        _ => None,
    }
}

#[async_trait]
pub trait PolicyAdvisor: Send + Sync {
    async fn advise(&self, request: &AdvisorRequest) -> Result<AdvisorReply, AdvisorError>;
}

/// Runs `program [args..] <user_id> <prompt>` and parses its stdout.
#[derive(Debug, Clone)]
pub struct ProcessAdvisor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessAdvisor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from a whitespace-separated command line such as `python3 recommend.py`.
    pub fn from_command_line(command: &str) -> Result<Self, AdvisorError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(AdvisorError::NotConfigured)?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PolicyAdvisor for ProcessAdvisor {
    async fn advise(&self, request: &AdvisorRequest) -> Result<AdvisorReply, AdvisorError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.user_id)
            .arg(&request.prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AdvisorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdvisorError::Timeout(self.timeout))?
            .map_err(|source| AdvisorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            warn!(program = %self.program, status = %output.status, "advisor failed");
            return Err(AdvisorError::Exit {
                status: output.status.to_string(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!(program = %self.program, %stderr, "advisor stderr");
        }

        parse_advisor_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_array_with_ids_is_structured() {
        let reply = parse_advisor_output(
            r#"[{"id": 7, "plcyNm": "청년 월세 지원", "reason": "무주택", "badges": ["주거", 3]},
                {"id": 9, "name": "취업 장려금"}]"#,
        )
        .unwrap();

        assert_eq!(
            reply,
            AdvisorReply::Structured(vec![
                Recommendation {
                    id: 7,
                    name: "청년 월세 지원".to_string(),
                    reason: Some("무주택".to_string()),
                    badges: vec!["주거".to_string()],
                },
                Recommendation {
                    id: 9,
                    name: "취업 장려금".to_string(),
                    reason: None,
                    badges: Vec::new(),
                },
            ])
        );
    }

    #[test]
    fn names_come_from_strings_and_name_keys() {
        let reply = parse_advisor_output(
            r#"["청년 월세 지원", {"plcyNm": "취업 장려금"}, {"name": "창업 공간"}, {"title": "자격증 지원"}, 42, ""]"#,
        )
        .unwrap();

        assert_eq!(
            reply,
            AdvisorReply::Names(vec![
                "청년 월세 지원".to_string(),
                "취업 장려금".to_string(),
                "창업 공간".to_string(),
                "자격증 지원".to_string(),
            ])
        );
    }

    #[test]
    fn non_array_reply_is_empty_and_garbage_is_an_error() {
        assert!(parse_advisor_output(r#"{"message": "no data"}"#).unwrap().is_empty());
        assert!(parse_advisor_output("[]").unwrap().is_empty());
        assert!(matches!(
            parse_advisor_output("Traceback (most recent call last)"),
            Err(AdvisorError::Decode(_))
        ));
    }

    #[test]
    fn blank_prompt_falls_back_to_default() {
        let request = AdvisorRequest::new("a@b.c", Some("   ".to_string()));
        assert_eq!(request.prompt, DEFAULT_PROMPT);
        let request = AdvisorRequest::new("a@b.c", Some("주거".to_string()));
        assert_eq!(request.prompt, "주거");
    }

    #[test]
    fn empty_command_line_is_not_configured() {
        assert!(matches!(
            ProcessAdvisor::from_command_line("  "),
            Err(AdvisorError::NotConfigured)
        ));
        let advisor = ProcessAdvisor::from_command_line("python3 recommend.py").unwrap();
        assert_eq!(advisor.program, "python3");
        assert_eq!(advisor.args, ["recommend.py"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_advisor_passes_user_and_prompt() {
        // `sh -c script $0 $1 $2`: the script echoes its two positional args back as names.
        let advisor = ProcessAdvisor::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"printf '["%s","%s"]' "$1" "$2""#.to_string(),
                "advisor".to_string(),
            ],
        );
        let reply = advisor
            .advise(&AdvisorRequest::new("user@example.com", Some("주거".to_string())))
            .await
            .expect("advise");
        assert_eq!(
            reply,
            AdvisorReply::Names(vec!["user@example.com".to_string(), "주거".to_string()])
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_process_reports_exit() {
        let advisor = ProcessAdvisor::new(
            "sh",
            vec!["-c".to_string(), "echo broken >&2; exit 3".to_string(), "advisor".to_string()],
        );
        let err = advisor
            .advise(&AdvisorRequest::new("u", None))
            .await
            .unwrap_err();
        match err {
            AdvisorError::Exit { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
