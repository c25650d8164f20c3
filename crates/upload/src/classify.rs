//! Maps platform responses onto the retry state machine's branches.

use anna_platform::SubmitResponse;

/// What an upload task should do with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accepted { remote_id: String },
    /// The CSRF token is stale; refresh and retry.
    AuthExpired { message: String },
    /// Moderation or length problem with the display name.
    NameRejected { message: String },
    /// The owning account is banned or suspended.
    AccountSuspended { message: String },
    Rejected { status: u16, message: String },
    Malformed { status: u16, body: String },
}

/// Whole phrases and reason codes only: a bare "banned" also shows up in
/// name moderation ("banned words") and proxy errors ("terminated").
const SUSPENSION_MARKERS: [&str; 12] = [
    "account has been suspended",
    "account has been banned",
    "account has been terminated",
    "account is suspended",
    "account is banned",
    "account is terminated",
    "account is locked",
    "user is suspended",
    "user is banned",
    "account_suspended",
    "account_banned",
    "user_banned",
];
const AUTH_MARKERS: [&str; 3] = ["xsrf", "csrf", "token validation"];
const MODERATION_MARKERS: [&str; 3] = ["moderat", "inappropriate", "banned word"];
const NAME_PROBLEM_MARKERS: [&str; 4] = ["length", "too long", "invalid", "empty"];

pub fn classify(response: SubmitResponse) -> Classification {
    let (status, reason_code, message) = match response {
        SubmitResponse::Accepted { remote_id } => return Classification::Accepted { remote_id },
        SubmitResponse::Malformed { status, body } => {
            return Classification::Malformed { status, body };
        }
        SubmitResponse::Rejected {
            status,
            reason_code,
            message,
        } => (status, reason_code, message),
    };

    let text = format!(
        "{} {}",
        message.to_lowercase(),
        reason_code.as_deref().unwrap_or_default().to_lowercase()
    );
    let mentions = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    // Anything about the display name is fixable by renaming.
    let about_name = text.contains("name");
    if about_name && (mentions(&MODERATION_MARKERS) || mentions(&NAME_PROBLEM_MARKERS)) {
        return Classification::NameRejected { message };
    }

    if mentions(&SUSPENSION_MARKERS) {
        return Classification::AccountSuspended { message };
    }

    // A bare 403 is how the platform signals a stale token.
    if status == 401 || (status == 403 && (mentions(&AUTH_MARKERS) || message.trim().is_empty()))
    {
        return Classification::AuthExpired { message };
    }

    if mentions(&MODERATION_MARKERS) {
        return Classification::NameRejected { message };
    }

    Classification::Rejected { status, message }
}
