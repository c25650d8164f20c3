//! Parsing of upload responses into a tagged result.

use serde::Deserialize;
use serde_json::Value;

/// Outcome of one submission round-trip, as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// The platform accepted the asset and returned an identifier for it.
    Accepted { remote_id: String },
    /// The platform refused the request.
    Rejected {
        status: u16,
        reason_code: Option<String>,
        message: String,
    },
    /// A success status whose body carried no usable identifier.
    Malformed { status: u16, body: String },
}

/// Body of an accepted upload (an asynchronous operation handle).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationBody {
    #[serde(default)]
    operation_id: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    asset_id: Option<Value>,
    #[serde(default)]
    response: Option<OperationResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    #[serde(default)]
    asset_id: Option<Value>,
}

/// Body of a rejected upload. The platform uses several shapes.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl SubmitResponse {
    /// Classifies a raw HTTP status and body.
    pub fn from_http(status: u16, body: &str) -> Self {
        if (200..300).contains(&status) {
            return match parse_remote_id(body) {
                Some(remote_id) => SubmitResponse::Accepted { remote_id },
                None => SubmitResponse::Malformed {
                    status,
                    body: body.to_string(),
                },
            };
        }

        let (reason_code, message) = parse_error(body);
        SubmitResponse::Rejected {
            status,
            reason_code,
            message,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResponse::Accepted { .. })
    }
}

fn parse_remote_id(body: &str) -> Option<String> {
    let op: OperationBody = serde_json::from_str(body).ok()?;

    op.response
        .and_then(|r| r.asset_id)
        .or(op.asset_id)
        .and_then(value_to_string)
        .or(op.operation_id.filter(|id| !id.is_empty()))
        .or_else(|| {
            op.path
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        })
}

fn parse_error(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    let Ok(err) = serde_json::from_str::<ErrorBody>(trimmed) else {
        return (None, trimmed.to_string());
    };

    let first = err.errors.into_iter().next().unwrap_or_default();
    let code = err.code.or(first.code).and_then(value_to_string);
    let message = err
        .message
        .or(first.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| trimmed.to_string());

    (code, message)
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
