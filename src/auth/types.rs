//! Wire types and errors for user-interactive authentication (UIA).
//!
//! These model the `401`-with-flows negotiation payloads defined by the Matrix
//! client-server spec, plus the error taxonomy the engine surfaces.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A UIA stage kind, identified on the wire by its login type string.
///
/// Every stage kind a client can meaningfully handle has its own variant;
/// anything else lands in [`AuthType::Other`] and is driven through the
/// generic fallback web page.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthType {
    Password,
    Recaptcha,
    Terms,
    EmailIdentity,
    Msisdn,
    Sso,
    SsoUnstable,
    Dummy,
    RegistrationToken,
    /// A stage type this client has no dedicated handler for.
    Other(String),
}

impl AuthType {
    pub fn as_str(&self) -> &str {
        match self {
            AuthType::Password => "m.login.password",
            AuthType::Recaptcha => "m.login.recaptcha",
            AuthType::Terms => "m.login.terms",
            AuthType::EmailIdentity => "m.login.email.identity",
            AuthType::Msisdn => "m.login.msisdn",
            AuthType::Sso => "m.login.sso",
            AuthType::SsoUnstable => "org.matrix.login.sso",
            AuthType::Dummy => "m.login.dummy",
            AuthType::RegistrationToken => "org.matrix.msc3231.login.registration_token",
            AuthType::Other(s) => s,
        }
    }

    /// Whether this is either the stable or unstable SSO stage type.
    pub fn is_sso(&self) -> bool {
        matches!(self, AuthType::Sso | AuthType::SsoUnstable)
    }
}

impl From<&str> for AuthType {
    fn from(s: &str) -> Self {
        match s {
            "m.login.password" => AuthType::Password,
            "m.login.recaptcha" => AuthType::Recaptcha,
            "m.login.terms" => AuthType::Terms,
            "m.login.email.identity" => AuthType::EmailIdentity,
            "m.login.msisdn" => AuthType::Msisdn,
            "m.login.sso" => AuthType::Sso,
            "org.matrix.login.sso" => AuthType::SsoUnstable,
            "m.login.dummy" => AuthType::Dummy,
            "org.matrix.msc3231.login.registration_token" => AuthType::RegistrationToken,
            other => AuthType::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuthType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuthType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(AuthType::from(s.as_str()))
    }
}

/// One flow the server will accept: an ordered list of stages to complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFlow {
    pub stages: Vec<AuthType>,
}

/// The UIA payload a server attaches to a `401` while authentication is
/// incomplete.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiaInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default)]
    pub flows: Vec<AuthFlow>,
    /// Stages already completed within this session.
    #[serde(default)]
    pub completed: Vec<AuthType>,
    /// Per-stage-type parameters, e.g. the recaptcha public key.
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UiaInfo {
    /// The server-supplied parameters for one stage type, if any.
    pub fn params_for(&self, stage: &AuthType) -> Option<&Value> {
        self.params.get(stage.as_str())
    }
}

/// The `auth` dict submitted alongside a request to satisfy one stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthDict {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<AuthType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthDict {
    /// A dict carrying only the session, for stages with no client input
    /// (SSO confirmation, fallback completion).
    pub fn for_stage(kind: AuthType) -> Self {
        AuthDict { kind: Some(kind), session: None, extra: Map::new() }
    }

    pub fn dummy() -> Self {
        AuthDict::for_stage(AuthType::Dummy)
    }

    pub fn password(user_id: &str, password: &str) -> Self {
        let mut dict = AuthDict::for_stage(AuthType::Password);
        dict.extra.insert(
            "identifier".into(),
            serde_json::json!({ "type": "m.id.user", "user": user_id }),
        );
        dict.extra.insert("password".into(), Value::String(password.to_owned()));
        dict
    }

    /// The email-identity dict binding a verified threepid by sid.
    pub fn email_identity(sid: &str, client_secret: &str) -> Self {
        let mut dict = AuthDict::for_stage(AuthType::EmailIdentity);
        dict.extra.insert(
            "threepid_creds".into(),
            serde_json::json!({ "sid": sid, "client_secret": client_secret }),
        );
        dict
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_owned(), value);
        self
    }
}

/// What the engine tells the prompter about the active stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageStatus {
    /// The UIA session this stage belongs to, needed by fallback-web stages.
    pub session: Option<String>,
    /// The session id of the email-verification request, once sent.
    pub email_sid: Option<String>,
    /// Machine-readable error code from the previous attempt at this stage.
    pub errcode: Option<String>,
    /// Human-readable error text from the previous attempt at this stage.
    pub error: Option<String>,
}

impl StageStatus {
    pub fn has_error(&self) -> bool {
        self.errcode.is_some() || self.error.is_some()
    }
}

/// An HTTP-level failure from the UIA collaborator, carrying whatever body
/// the server returned.
#[derive(Clone, Debug, thiserror::Error)]
#[error("request failed with status {status}")]
pub struct HttpError {
    pub status: u16,
    pub body: Value,
}

impl HttpError {
    pub fn new(status: u16, body: Value) -> Self {
        HttpError { status, body }
    }

    /// The UIA payload embedded in the error body, when the status is 401
    /// and the body parses as one.
    pub fn uia_info(&self) -> Option<UiaInfo> {
        if self.status != 401 {
            return None;
        }
        serde_json::from_value(self.body.clone()).ok()
    }
}

/// Everything that can go wrong while driving an interactive-auth attempt.
#[derive(Debug, thiserror::Error)]
pub enum UiaError {
    /// The user backed out. Distinguished so callers can dismiss quietly
    /// instead of showing an error.
    #[error("authentication cancelled by the user")]
    Cancelled,

    /// No server-offered flow is satisfiable with the inputs we hold.
    #[error("no auth flow usable with the provided credentials")]
    NoFlowFound {
        available_flows: Vec<AuthFlow>,
    },

    /// A fatal HTTP failure: any non-401 status, or a 401 without flows.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The email stage was reached but no email address was supplied.
    #[error("stage requires an input that was not provided")]
    MissingInput,

    /// The engine was driven out of order (e.g. submitting with no session).
    #[error("interactive auth engine in an unexpected state: {0}")]
    BadState(&'static str),
}
