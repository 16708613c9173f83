/// Field validation for producer payloads
///
/// Checks are collected rather than short-circuited so a producer sees every
/// problem with a payload in one round trip.
use crate::{
    entry::{EntryDraft, Extension},
    error::LedgerError,
};

pub const MAX_MESSAGE_LEN: usize = 1024;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_ROLE_LEN: usize = 64;
pub const MAX_URL_LEN: usize = 512;
pub const MAX_CHAT_MESSAGE_LEN: usize = 512;
pub const MAX_TICKET_LEN: usize = 128;

/// Validation error detail
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

/// Validation result with detailed errors
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Accumulates errors for one payload
#[derive(Debug, Default)]
pub(crate) struct Checker {
    errors: Vec<ValidationError>,
}

impl Checker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.to_string(),
            message: message.into(),
        });
    }

    pub(crate) fn require<T>(&mut self, path: &str, value: &Option<T>) {
        if value.is_none() {
            self.fail(path, format!("Required field '{}' is missing", path));
        }
    }

    pub(crate) fn max_len(&mut self, path: &str, value: Option<&str>, max: usize) {
        if let Some(s) = value {
            let count = s.chars().count();
            if count > max {
                self.fail(
                    path,
                    format!("Exceeds maximum length of {} characters: {}", max, count),
                );
            }
        }
    }

    pub(crate) fn non_empty(&mut self, path: &str, value: &str, max: usize) {
        if value.trim().is_empty() {
            self.fail(path, "Must not be empty");
        } else {
            self.max_len(path, Some(value), max);
        }
    }

    pub(crate) fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    pub(crate) fn into_ledger_result(self) -> Result<(), LedgerError> {
        self.finish().map_err(validation_errors_to_ledger_error)
    }
}

/// Validate base fields of a new entry
pub fn validate_draft(draft: &EntryDraft) -> ValidationResult {
    let mut check = Checker::new();

    check.require("subject", &draft.subject);
    check.require("issued_at", &draft.issued_at);
    check.max_len("message", draft.message.as_deref(), MAX_MESSAGE_LEN);

    if let Some(window) = &draft.relevant_logs {
        if window.begin > window.end {
            check.fail("relevant_logs", "Window begins after it ends");
        }
    }

    if draft.is_legacy && draft.legacy_id.is_none() {
        check.fail("legacy_id", "Legacy entries must carry their legacy id");
    }

    if !draft.pending_reputation.is_finite() {
        check.fail("pending_reputation", "Must be a finite number");
    }
    if matches!(draft.reputation, Some(r) if !r.is_finite()) {
        check.fail("reputation", "Must be a finite number");
    }

    check.finish()
}

/// Validate variant-specific fields
pub fn validate_extension(extension: &Extension) -> ValidationResult {
    let mut check = Checker::new();

    if let Some(punishment) = extension.duration() {
        if punishment.duration_secs < -1 {
            check.fail(
                "duration_secs",
                "Use -1 for permanent punishments; other negative durations are invalid",
            );
        }
        if let Some(preset) = &punishment.preset {
            if preset.level < 1 {
                check.fail("preset.level", "Preset levels start at 1");
            }
        }
        if let Some(forgiveness) = &punishment.forgiveness {
            check.max_len("forgiveness.reason", forgiveness.reason.as_deref(), MAX_REASON_LEN);
        }
    }

    match extension {
        Extension::Appeal(appeal) => {
            check.non_empty("ticket_id", &appeal.ticket_id, MAX_TICKET_LEN);
        }
        Extension::AntiCheatKick(kick) => {
            check.max_len("kick_message", kick.kick_message.as_deref(), MAX_MESSAGE_LEN);
        }
        Extension::Teamkill(tk) => {
            if matches!(tk.distance, Some(d) if !(d.is_finite() && d >= 0.0)) {
                check.fail("distance", "Must be a non-negative finite number");
            }
        }
        Extension::AcceptedReport(accepted) => {
            if accepted.accepted_report.is_none() && accepted.issue_reference.is_none() {
                check.fail(
                    "accepted_report",
                    "Either an accepted report or an issue reference is required",
                );
            }
        }
        _ => {}
    }

    check.finish()
}

/// Convert validation errors to LedgerError
pub fn validation_errors_to_ledger_error(errors: Vec<ValidationError>) -> LedgerError {
    let messages: Vec<String> = errors
        .iter()
        .map(|e| format!("{}: {}", e.path, e.message))
        .collect();

    LedgerError::Validation(format!("Payload validation failed:\n  - {}", messages.join("\n  - ")))
}
