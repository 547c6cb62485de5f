use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::session::AuthSession;
use crate::types::RemoteState;
use crate::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://57uh36mbv1.execute-api.ap-southeast-2.amazonaws.com/api";
pub const DEFAULT_STATE_API_URL: &str =
    "https://tgjgb3bcf3.execute-api.ap-southeast-2.amazonaws.com/prod/v1";

const DEVICE_ID_PARAM: &str = "macAddressId";

fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| Error::Config(format!("invalid base url {base:?}: {e}")))
}

fn with_segment(base: &str, segment: &str) -> Result<Url> {
    let mut url = parse_base(base)?;
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("base url cannot carry a path: {base}")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

pub fn devices_url(api: &str) -> Result<Url> {
    with_segment(api, "loadmobiledevice")
}

pub fn running_state_url(api: &str, device_id: &str) -> Result<Url> {
    let mut url = with_segment(api, "loadsystemrunning")?;
    url.query_pairs_mut().append_pair(DEVICE_ID_PARAM, device_id);
    Ok(url)
}

pub fn system_details_url(api: &str, device_id: &str) -> Result<Url> {
    let mut url = with_segment(api, "loadsystemdetails")?;
    url.query_pairs_mut().append_pair(DEVICE_ID_PARAM, device_id);
    Ok(url)
}

/// `{state_api}/devices/{device_id}`, with the id escaped as a single path
/// segment.
pub fn update_state_url(state_api: &str, device_id: &str) -> Result<Url> {
    let mut url = with_segment(state_api, "devices")?;
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("base url cannot carry a path: {state_api}")))?
        .push(device_id);
    Ok(url)
}

pub fn update_state_body(device_id: &str, state: &RemoteState) -> Value {
    json!({
        DEVICE_ID_PARAM: device_id,
        "state": state,
    })
}

pub fn auth_request_body(client_id: &str, username: &str, password: &str) -> Value {
    json!({
        "AuthFlow": "USER_PASSWORD_AUTH",
        "ClientId": client_id,
        "AuthParameters": {
            "USERNAME": username,
            "PASSWORD": password
        }
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthResult>,
    #[serde(default)]
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthResult {
    id_token: String,
    expires_in: i64,
}

/// Turn an `InitiateAuth` response into a session expiring `ExpiresIn`
/// seconds after `now`.
pub fn parse_auth_response(body: &str, now: i64) -> Result<AuthSession> {
    let parsed: AuthResponse = serde_json::from_str(body)
        .map_err(|e| Error::Authentication(format!("malformed auth response: {e}")))?;
    match (parsed.authentication_result, parsed.challenge_name) {
        (Some(result), _) => Ok(AuthSession {
            token: result.id_token,
            expires_at: now + result.expires_in,
        }),
        (None, Some(challenge)) => Err(Error::Authentication(format!(
            "unsupported auth challenge: {challenge}"
        ))),
        (None, None) => Err(Error::Authentication(
            "auth response carried no token".to_string(),
        )),
    }
}

/// Pull a human-readable message out of an error body, if there is one.
pub fn upstream_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    ["message", "Message", "error"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_ids_are_escaped() {
        let url = running_state_url("https://example.com/api", "ab/c d&e").unwrap();
        assert_eq!(url.path(), "/api/loadsystemrunning");
        assert_eq!(url.query(), Some("macAddressId=ab%2Fc+d%26e"));

        let url = system_details_url("https://example.com/api/", "0A1B").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/loadsystemdetails?macAddressId=0A1B");
    }

    #[test]
    fn path_ids_are_escaped() {
        let url = update_state_url("https://example.com/prod/v1", "ab/c d").unwrap();
        assert_eq!(url.path(), "/prod/v1/devices/ab%2Fc%20d");
    }

    #[test]
    fn devices_url_joins_path() {
        let url = devices_url("http://127.0.0.1:8080/api").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/loadmobiledevice");
    }

    #[test]
    fn bad_base_is_config_error() {
        assert!(matches!(devices_url("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn update_body_wraps_full_state() {
        let state: RemoteState =
            serde_json::from_value(json!({"SystemOn": 1, "CTemp": 22})).unwrap();
        let body = update_state_body("0A1B", &state);
        assert_eq!(body["macAddressId"], "0A1B");
        assert_eq!(body["state"]["SystemOn"], 1);
        assert_eq!(body["state"]["CTemp"], 22);
    }

    #[test]
    fn auth_response_yields_session() {
        let body = r#"{
            "AuthenticationResult": {"IdToken": "abc", "ExpiresIn": 3600, "TokenType": "Bearer"}
        }"#;
        let session = parse_auth_response(body, 1000).unwrap();
        assert_eq!(session.token, "abc");
        assert_eq!(session.expires_at, 4600);
    }

    #[test]
    fn auth_challenge_is_rejected() {
        let body = r#"{"ChallengeName": "NEW_PASSWORD_REQUIRED", "Session": "x"}"#;
        let err = parse_auth_response(body, 0).unwrap_err();
        match err {
            Error::Authentication(msg) => assert!(msg.contains("NEW_PASSWORD_REQUIRED")),
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[test]
    fn upstream_message_extraction() {
        let body = r#"{
            "__type": "NotAuthorizedException",
            "message": "Incorrect username or password."
        }"#;
        assert_eq!(
            upstream_message(body).as_deref(),
            Some("Incorrect username or password.")
        );
        assert_eq!(upstream_message("<html>"), None);
    }
}
