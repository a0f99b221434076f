use crate::http::ReqParam;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const INCIDENT_PREFIX: &str = "INC";
const INCIDENT_LENGTH: usize = 10;
pub const TRT_CALL_TYPE: &str = "major_incident_trt";

fn incident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^INC\d{7}$").expect("incident pattern is valid"))
}

/// An incident number of the form `INC` followed by seven digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct IncidentNumber(String);

impl IncidentNumber {
    /// Applies the input auto-format of the incident tab: upper-cases, forces the `INC` prefix,
    /// drops non-digits after it and caps the result at ten characters.
    pub fn normalize(input: &str) -> String {
        let upper = input.trim().to_uppercase();
        let digits: String = match upper.strip_prefix(INCIDENT_PREFIX) {
            Some(rest) => rest.chars().filter(char::is_ascii_digit).collect(),
            None if upper.starts_with(|c: char| c.is_ascii_digit()) => {
                upper.chars().filter(char::is_ascii_digit).collect()
            }
            None => String::new(),
        };
        let mut formatted = format!("{INCIDENT_PREFIX}{digits}");
        formatted.truncate(INCIDENT_LENGTH);
        formatted
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for IncidentNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if incident_pattern().is_match(s) {
            Ok(IncidentNumber(s.to_string()))
        } else {
            Err(format!(
                "Please enter a valid incident number in format INC1234567, got {s:?}"
            ))
        }
    }
}

impl fmt::Display for IncidentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IncidentDetails {
    pub number: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default, deserialize_with = "display_value")]
    pub assigned_to: String,
    #[serde(default)]
    pub sys_id: String,
}

impl IncidentDetails {
    pub fn state_label(&self) -> &str {
        match self.state.as_str() {
            "1" => "New",
            "2" => "In Progress",
            "3" => "On Hold",
            "6" => "Resolved",
            "7" => "Closed",
            other => other,
        }
    }

    pub fn priority_label(&self) -> &str {
        match self.priority.as_str() {
            "1" => "Critical",
            "2" => "High",
            "3" => "Moderate",
            "4" => "Low",
            "5" => "Planning",
            other => other,
        }
    }
}

/// Reference fields come back either as a plain string or as `{display_value, value, link}`.
fn display_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Object(map) => map
            .get("display_value")
            .or_else(|| map.get("value"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Incident as served to the tab, with human readable state and priority.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct IncidentView {
    #[serde(flatten)]
    pub details: IncidentDetails,
    pub state_label: String,
    pub priority_label: String,
}

impl From<IncidentDetails> for IncidentView {
    fn from(details: IncidentDetails) -> Self {
        IncidentView {
            state_label: details.state_label().to_string(),
            priority_label: details.priority_label().to_string(),
            details,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct IncidentLookupResponse {
    #[serde(default)]
    pub result: Vec<IncidentDetails>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct TrtCallRequest {
    pub incident_number: String,
    pub call_type: String,
}

impl TrtCallRequest {
    pub fn major_incident(number: &IncidentNumber) -> Self {
        TrtCallRequest {
            incident_number: number.to_string(),
            call_type: TRT_CALL_TYPE.to_string(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TrtCallResult {
    pub incident_number: String,
    pub triggered: bool,
    pub message: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CredentialCheck {
    Valid { incidents_visible: usize },
    Unauthorized,
    Forbidden,
    Failed { status_code: u16, body: String },
}

/// Static credentials the relay presents to ServiceNow when no OAuth token is held.
#[derive(Clone, Default, PartialEq)]
pub enum Credentials {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    ClientHeaders {
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    pub fn headers(&self) -> Vec<ReqParam> {
        match self {
            Credentials::None => vec![],
            Credentials::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                vec![ReqParam::new("Authorization", format!("Basic {encoded}"))]
            }
            Credentials::ClientHeaders {
                client_id,
                client_secret,
            } => vec![
                ReqParam::new("X-Client-ID", client_id.clone()),
                ReqParam::new("X-Client-Secret", client_secret.clone()),
            ],
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::ClientHeaders { client_id, .. } => f
                .debug_struct("ClientHeaders")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_formats_partial_input() {
        assert_eq!(IncidentNumber::normalize("inc0008001"), "INC0008001");
        assert_eq!(IncidentNumber::normalize("8001"), "INC8001");
        assert_eq!(IncidentNumber::normalize("INC00-08a001"), "INC0008001");
        assert_eq!(IncidentNumber::normalize("abc"), "INC");
        assert_eq!(IncidentNumber::normalize("INC000800123"), "INC0008001");
    }

    #[test]
    fn only_seven_digit_numbers_parse() {
        assert!(IncidentNumber::from_str("INC0008001").is_ok());
        assert!(IncidentNumber::from_str("INC000800").is_err());
        assert!(IncidentNumber::from_str("inc0008001").is_err());
        assert!(IncidentNumber::from_str("INC00080011").is_err());
    }

    #[test]
    fn labels_fall_back_to_raw_codes() {
        let mut incident = IncidentDetails {
            number: "INC0008001".to_string(),
            short_description: "".to_string(),
            state: "2".to_string(),
            priority: "1".to_string(),
            assigned_to: "".to_string(),
            sys_id: "".to_string(),
        };
        assert_eq!(incident.state_label(), "In Progress");
        assert_eq!(incident.priority_label(), "Critical");
        incident.state = "42".to_string();
        incident.priority = "9".to_string();
        assert_eq!(incident.state_label(), "42");
        assert_eq!(incident.priority_label(), "9");
    }

    #[test]
    fn assigned_to_accepts_reference_objects() {
        let incident: IncidentDetails = serde_json::from_value(json!({
            "number": "INC0008002",
            "state": "1",
            "assigned_to": {"display_value": "Sarah Johnson", "link": "https://x"}
        }))
        .unwrap();
        assert_eq!(incident.assigned_to, "Sarah Johnson");

        let incident: IncidentDetails = serde_json::from_value(json!({
            "number": "INC0008002",
            "assigned_to": {"value": "6816f79cc0a8016401c5a33be04be441", "link": "https://x"}
        }))
        .unwrap();
        assert_eq!(incident.assigned_to, "6816f79cc0a8016401c5a33be04be441");
    }

    #[test]
    fn basic_credentials_encode_user_and_password() {
        let headers = Credentials::Basic {
            username: "admin".to_string(),
            password: "pa:ss".to_string(),
        }
        .headers();
        assert_eq!(headers, vec![ReqParam::new("Authorization", "Basic YWRtaW46cGE6c3M=")]);
        assert_eq!(Credentials::None.headers(), vec![]);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let credentials = Credentials::ClientHeaders {
            client_id: "f5128ff2".to_string(),
            client_secret: "VxgMXG".to_string(),
        };
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("f5128ff2"));
        assert!(!rendered.contains("VxgMXG"));
    }
}
