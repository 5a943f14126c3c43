use std::collections::HashMap;

use serde::Serialize;

/// Key marking a push payload as a direct (auto-answer) call.
pub const DIRECT_CALL_KEY: &str = "isDirectCall";

/// Call request delivered by the push/notification collaborator. Consumed
/// once to seed a call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallRequest {
    pub account_id: String,
    pub application_id: String,
    pub from_number: String,
    pub to_number: String,
    /// Pre-authorized bearer token; skips the token fetch when present.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub direct: bool,
}

impl IncomingCallRequest {
    /// Parse the flat string map a push message carries.
    pub fn from_map(data: &HashMap<String, String>) -> Result<Self, IncomingError> {
        let field = |key: &str| data.get(key).map(|v| v.trim()).unwrap_or_default();

        let from_number = strip_plus(field("fromNo"));
        if from_number.is_empty() {
            return Err(IncomingError::MissingField("fromNo"));
        }

        let token = Some(field("token"))
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let direct = data
            .get(DIRECT_CALL_KEY)
            .is_some_and(|v| !v.trim().eq_ignore_ascii_case("false"));

        Ok(Self {
            account_id: field("accountId").to_string(),
            application_id: field("applicationId").to_string(),
            from_number,
            to_number: strip_plus(field("toNo")),
            token,
            direct,
        })
    }

    /// The same request, marked for immediate connection.
    pub fn accepted(mut self) -> Self {
        self.direct = true;
        self
    }
}

fn strip_plus(number: &str) -> String {
    number.trim_start_matches('+').to_string()
}

/// Outcome of handing an inbound request to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingDisposition {
    /// Direct call: placed immediately.
    Placed,
    /// Shown to the user; nothing happens until they accept.
    Presented,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IncomingError {
    #[error("Incoming call payload is missing '{0}'")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_direct_call_with_token() {
        let req = IncomingCallRequest::from_map(&payload(&[
            ("accountId", "acct"),
            ("applicationId", "app"),
            ("fromNo", "+4155550100"),
            ("toNo", "+15551234567"),
            ("token", "pre-auth"),
            (DIRECT_CALL_KEY, "true"),
        ]))
        .unwrap();

        assert_eq!(req.account_id, "acct");
        assert_eq!(req.application_id, "app");
        assert_eq!(req.from_number, "4155550100");
        assert_eq!(req.to_number, "15551234567");
        assert_eq!(req.token.as_deref(), Some("pre-auth"));
        assert!(req.direct);
    }

    #[test]
    fn marker_absent_means_not_direct() {
        let req = IncomingCallRequest::from_map(&payload(&[("fromNo", "4155550100")])).unwrap();
        assert!(!req.direct);
        assert_eq!(req.token, None);
    }

    #[test]
    fn explicit_false_marker_is_not_direct() {
        let req = IncomingCallRequest::from_map(&payload(&[
            ("fromNo", "1"),
            (DIRECT_CALL_KEY, "false"),
        ]))
        .unwrap();
        assert!(!req.direct);
    }

    #[test]
    fn empty_token_is_absent() {
        let req =
            IncomingCallRequest::from_map(&payload(&[("fromNo", "1"), ("token", "")])).unwrap();
        assert_eq!(req.token, None);
    }

    #[test]
    fn missing_from_is_rejected() {
        let err = IncomingCallRequest::from_map(&payload(&[("toNo", "1")])).unwrap_err();
        assert!(matches!(err, IncomingError::MissingField("fromNo")));
    }

    #[test]
    fn accepting_marks_direct() {
        let req = IncomingCallRequest::from_map(&payload(&[("fromNo", "1")])).unwrap();
        assert!(req.accepted().direct);
    }
}
