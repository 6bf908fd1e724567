//! The interactive-auth (UIA) state machine.
//!
//! Drives the `401`-with-flows negotiation: issue the request, learn the
//! server's acceptable flows, walk the chosen flow's stages by prompting the
//! caller-supplied [`StagePrompter`] for each, and resubmit until the server
//! accepts. The HTTP transport and the UI are both collaborators injected at
//! construction; the engine itself is headless.

use eyeball::SharedObservable;
use futures_util::future::BoxFuture;
use rand::{Rng, distributions::Alphanumeric};
use serde_json::{Map, Value};
use tokio::time::{Duration, Instant, interval_at};
use tracing::{debug, trace, warn};

use crate::auth::types::{
    AuthDict, AuthFlow, AuthType, HttpError, StageStatus, UiaError, UiaInfo,
};

/// How often an out-of-band-completable stage (email verification) re-checks
/// with the server while the prompt is still open.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// The HTTP collaborator: knows how to perform the operation being guarded
/// by UIA (register, delete device, ...) with an optional `auth` dict
/// attached, and how to request an email verification token.
pub trait UiaRequest: Send + Sync {
    /// Performs the guarded request. A `401` whose body carries UIA data is
    /// returned as an [`HttpError`] and interpreted by the engine.
    fn send(&self, auth: Option<&AuthDict>) -> BoxFuture<'_, Result<Value, HttpError>>;

    /// Asks the homeserver to email a verification token, resolving to the
    /// session id (`sid`) of that verification attempt. `session` is the UIA
    /// session the token belongs to, when one is already open.
    fn request_email_token(
        &self,
        email: &str,
        client_secret: &str,
        attempt: u32,
        session: Option<&str>,
    ) -> BoxFuture<'_, Result<String, HttpError>>;
}

/// What the prompter resolved the active stage to.
#[derive(Clone, Debug, PartialEq)]
pub enum StageDecision {
    /// Submit this auth dict for the stage.
    Submit(AuthDict),
    /// The user backed out of the whole attempt.
    Cancel,
}

/// The UI collaborator: presents one stage to the user and resolves once
/// they have produced credentials or given up.
pub trait StagePrompter: Send + Sync {
    fn prompt(
        &self,
        stage: &AuthType,
        params: Option<&Value>,
        status: &StageStatus,
    ) -> BoxFuture<'_, StageDecision>;
}

/// Observes (stage, phase) transitions, e.g. to swap what a dialog renders.
/// Phase is `0` for single-phase stages.
pub type PhaseObserver = Box<dyn Fn(&AuthType, u32) + Send + Sync>;

/// Caller-known inputs that constrain which flow is satisfiable.
#[derive(Clone, Debug, Default)]
pub struct AuthInputs {
    /// Email address for the email-identity stage.
    pub email: Option<String>,
    /// Phone number for the msisdn stage.
    pub msisdn: Option<String>,
    /// Client secret to reuse for threepid verification; a random one is
    /// generated when absent.
    pub client_secret: Option<String>,
}

/// What happened while a prompt was open.
enum PromptWait {
    Decided(StageDecision),
    /// A background poll found the request already satisfiable and the
    /// server accepted it.
    Finished(Value),
}

pub struct InteractiveAuth<C: UiaRequest> {
    client: C,
    prompter: Box<dyn StagePrompter>,
    inputs: AuthInputs,
    client_secret: String,
    email_sid: Option<String>,
    email_attempt: u32,
    /// The most recent UIA payload from the server.
    data: UiaInfo,
    current_stage: Option<AuthType>,
    poll_enabled: bool,
    busy: SharedObservable<bool>,
    phase_observer: Option<PhaseObserver>,
}

impl<C: UiaRequest> InteractiveAuth<C> {
    pub fn new(client: C, prompter: Box<dyn StagePrompter>, inputs: AuthInputs) -> Self {
        let client_secret =
            inputs.client_secret.clone().unwrap_or_else(generate_client_secret);
        InteractiveAuth {
            client,
            prompter,
            inputs,
            client_secret,
            email_sid: None,
            email_attempt: 0,
            data: UiaInfo::default(),
            current_stage: None,
            poll_enabled: false,
            busy: SharedObservable::new(false),
            phase_observer: None,
        }
    }

    /// Resumes a previously started UIA session instead of opening a new one.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.data.session = Some(session.into());
        self
    }

    /// Enables background polling while prompts are open.
    pub fn with_polling(mut self) -> Self {
        self.poll_enabled = true;
        self
    }

    pub fn with_phase_observer(mut self, observer: PhaseObserver) -> Self {
        self.phase_observer = Some(observer);
        self
    }

    /// Observable that is `true` while a foreground request is in flight.
    pub fn busy(&self) -> SharedObservable<bool> {
        self.busy.clone()
    }

    /// The verification sid of the email token request, once one was made.
    /// Needed by callers that bind the threepid after registration.
    pub fn email_sid(&self) -> Option<&str> {
        self.email_sid.as_deref()
    }

    /// The client secret used for threepid verification.
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// The stage currently being prompted, if any.
    pub fn current_stage(&self) -> Option<&AuthType> {
        self.current_stage.as_ref()
    }

    /// Drives the whole negotiation to completion.
    ///
    /// Resolves with the guarded request's success response; rejects with
    /// [`UiaError::Cancelled`] if the user backs out, and with the
    /// underlying [`UiaError::Http`] for any fatal server response.
    pub async fn attempt_auth(&mut self) -> Result<Value, UiaError> {
        // First request: bare, or session-only when resuming. The server
        // either accepts outright or answers 401 with its flows.
        let initial = self.data.session.clone().map(|session| AuthDict {
            kind: None,
            session: Some(session),
            extra: Map::new(),
        });
        let mut response = self.submit(initial.as_ref()).await;

        loop {
            match response {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(info) = err.uia_info() else {
                        return Err(UiaError::Http(err));
                    };
                    if info.flows.is_empty() && self.data.flows.is_empty() {
                        // A 401 that never offered flows is not UIA at all.
                        return Err(UiaError::Http(err));
                    }
                    self.absorb(info);
                }
            }

            let flow = self.choose_flow()?;
            let stage = match self.first_uncompleted_stage(&flow) {
                Some(stage) => stage,
                None => {
                    return Err(UiaError::BadState(
                        "every stage completed but the request was still rejected",
                    ));
                }
            };
            self.enter_stage(stage.clone());

            if stage == AuthType::EmailIdentity && self.email_sid.is_none() {
                self.request_email_token().await?;
            }

            let dict = if stage == AuthType::Dummy {
                // Nothing to ask the user.
                AuthDict::dummy()
            } else {
                match self.prompt_stage(&stage).await {
                    PromptWait::Finished(value) => return Ok(value),
                    PromptWait::Decided(StageDecision::Cancel) => {
                        debug!("Interactive auth cancelled at stage {stage}");
                        return Err(UiaError::Cancelled);
                    }
                    PromptWait::Decided(StageDecision::Submit(dict)) => dict,
                }
            };

            response = self.submit(Some(&self.attach_session(dict))).await;
        }
    }

    /// Submits one foreground request, toggling the busy observable around it.
    async fn submit(&self, auth: Option<&AuthDict>) -> Result<Value, HttpError> {
        self.busy.set(true);
        let result = self.client.send(auth).await;
        self.busy.set(false);
        result
    }

    /// Folds a fresh UIA payload into the engine's state. Some servers omit
    /// `session`/`flows`/`completed` on stage-failure responses, so missing
    /// fields are inherited from the previous payload.
    fn absorb(&mut self, info: UiaInfo) {
        let previous = std::mem::take(&mut self.data);
        self.data = UiaInfo {
            session: info.session.or(previous.session),
            flows: if info.flows.is_empty() { previous.flows } else { info.flows },
            completed: if info.completed.is_empty() {
                previous.completed
            } else {
                info.completed
            },
            params: if info.params.is_empty() { previous.params } else { info.params },
            errcode: info.errcode,
            error: info.error,
        };
    }

    /// Picks the first flow consistent with the inputs we hold: a flow
    /// requiring email/msisdn verification is only usable if the caller
    /// supplied that input, and a supplied input must be consumed.
    fn choose_flow(&self) -> Result<AuthFlow, UiaError> {
        let have_email = self.inputs.email.is_some() || self.email_sid.is_some();
        let have_msisdn = self.inputs.msisdn.is_some();
        for flow in &self.data.flows {
            let flow_has_email = flow.stages.contains(&AuthType::EmailIdentity);
            let flow_has_msisdn = flow.stages.contains(&AuthType::Msisdn);
            if flow_has_email == have_email && flow_has_msisdn == have_msisdn {
                return Ok(flow.clone());
            }
        }
        warn!(
            "No auth flow found for email={have_email} msisdn={have_msisdn} among {} flows",
            self.data.flows.len(),
        );
        Err(UiaError::NoFlowFound { available_flows: self.data.flows.clone() })
    }

    fn first_uncompleted_stage(&self, flow: &AuthFlow) -> Option<AuthType> {
        flow.stages.iter().find(|stage| !self.data.completed.contains(stage)).cloned()
    }

    fn enter_stage(&mut self, stage: AuthType) {
        if self.current_stage.as_ref() != Some(&stage) {
            trace!("Entering auth stage {stage}");
            if let Some(observer) = &self.phase_observer {
                observer(&stage, 0);
            }
        }
        self.current_stage = Some(stage);
    }

    async fn request_email_token(&mut self) -> Result<(), UiaError> {
        let email = self.inputs.email.as_deref().ok_or(UiaError::MissingInput)?;
        self.email_attempt += 1;
        debug!("Requesting email verification token, attempt {}", self.email_attempt);
        let sid = self
            .client
            .request_email_token(
                email,
                &self.client_secret,
                self.email_attempt,
                self.data.session.as_deref(),
            )
            .await?;
        self.email_sid = Some(sid);
        Ok(())
    }

    /// Prompts for one stage, polling the server in the background while the
    /// prompt is open (when enabled). A successful background poll completes
    /// the attempt without waiting for the prompt.
    async fn prompt_stage(&mut self, stage: &AuthType) -> PromptWait {
        let params = self.data.params_for(stage).cloned();
        let status = StageStatus {
            session: self.data.session.clone(),
            email_sid: self.email_sid.clone(),
            errcode: self.data.errcode.take(),
            error: self.data.error.take(),
        };
        let poll_dict = self.poll_dict(stage);

        let mut deferred_info = None;
        let wait = {
            let mut prompt = self.prompter.prompt(stage, params.as_ref(), &status);
            let mut ticker = interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
            loop {
                tokio::select! {
                    decision = &mut prompt => break PromptWait::Decided(decision),
                    _ = ticker.tick(), if self.poll_enabled => {
                        match self.client.send(Some(&poll_dict)).await {
                            Ok(value) => break PromptWait::Finished(value),
                            Err(err) => {
                                // Stage not satisfiable yet; remember any
                                // refreshed UIA data, otherwise stay quiet.
                                if let Some(info) = err.uia_info() {
                                    deferred_info = Some(info);
                                } else {
                                    trace!("Background auth poll failed: {err}");
                                }
                            }
                        }
                    }
                }
            }
        };
        if let Some(info) = deferred_info {
            self.absorb(info);
        }
        wait
    }

    /// The auth dict a background poll submits: threepid creds for the email
    /// stage (the server completes it once the user clicks the link),
    /// session-only otherwise.
    fn poll_dict(&self, stage: &AuthType) -> AuthDict {
        let dict = match (stage, &self.email_sid) {
            (AuthType::EmailIdentity, Some(sid)) => {
                AuthDict::email_identity(sid, &self.client_secret)
            }
            _ => AuthDict::default(),
        };
        self.attach_session(dict)
    }

    fn attach_session(&self, mut dict: AuthDict) -> AuthDict {
        dict.session = self.data.session.clone();
        dict
    }
}

fn generate_client_secret() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures_util::FutureExt;
    use serde_json::json;

    use super::*;

    /// Scripted transport: pops one canned response per request and records
    /// every auth dict it was sent.
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<Vec<Result<Value, HttpError>>>,
        seen_auth: Arc<Mutex<Vec<Option<AuthDict>>>>,
        email_token: Option<Result<String, HttpError>>,
        token_sessions: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Value, HttpError>>) -> Self {
            ScriptedClient {
                // pop() takes from the back
                responses: Mutex::new(responses.into_iter().rev().collect()),
                seen_auth: Arc::default(),
                email_token: None,
                token_sessions: Arc::default(),
            }
        }

        fn with_email_token(mut self, sid: &str) -> Self {
            self.email_token = Some(Ok(sid.to_owned()));
            self
        }
    }

    impl UiaRequest for ScriptedClient {
        fn send(&self, auth: Option<&AuthDict>) -> BoxFuture<'_, Result<Value, HttpError>> {
            self.seen_auth.lock().unwrap().push(auth.cloned());
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(HttpError::new(500, json!({"unscripted": true}))));
            async move { response }.boxed()
        }

        fn request_email_token(
            &self,
            _email: &str,
            _client_secret: &str,
            _attempt: u32,
            session: Option<&str>,
        ) -> BoxFuture<'_, Result<String, HttpError>> {
            self.token_sessions.lock().unwrap().push(session.map(str::to_owned));
            let response = self.email_token.clone().unwrap_or_else(|| Ok("sid".to_owned()));
            async move { response }.boxed()
        }
    }

    /// Prompter that pops one scripted decision per prompt.
    struct ScriptedPrompter {
        decisions: Mutex<Vec<StageDecision>>,
        seen_stages: Arc<Mutex<Vec<(AuthType, StageStatus)>>>,
    }

    impl ScriptedPrompter {
        fn new(decisions: Vec<StageDecision>) -> Self {
            ScriptedPrompter {
                decisions: Mutex::new(decisions.into_iter().rev().collect()),
                seen_stages: Arc::default(),
            }
        }
    }

    impl StagePrompter for ScriptedPrompter {
        fn prompt(
            &self,
            stage: &AuthType,
            _params: Option<&Value>,
            status: &StageStatus,
        ) -> BoxFuture<'_, StageDecision> {
            self.seen_stages.lock().unwrap().push((stage.clone(), status.clone()));
            let decision = self.decisions.lock().unwrap().pop();
            async move {
                match decision {
                    Some(decision) => decision,
                    // no script left: hang like an unanswered dialog
                    None => std::future::pending().await,
                }
            }
            .boxed()
        }
    }

    /// Prompter that never resolves, like a dialog nobody interacts with.
    struct SilentPrompter;

    impl StagePrompter for SilentPrompter {
        fn prompt(
            &self,
            _stage: &AuthType,
            _params: Option<&Value>,
            _status: &StageStatus,
        ) -> BoxFuture<'_, StageDecision> {
            std::future::pending().boxed()
        }
    }

    fn uia_401(body: Value) -> HttpError {
        HttpError::new(401, body)
    }

    fn password_flow_401() -> HttpError {
        uia_401(json!({
            "session": "sess",
            "flows": [{ "stages": ["m.login.password"] }],
            "params": {},
        }))
    }

    #[tokio::test]
    async fn completes_a_single_password_stage() {
        let client = ScriptedClient::new(vec![
            Err(password_flow_401()),
            Ok(json!({ "user_id": "@u:x" })),
        ]);
        let seen_auth = client.seen_auth.clone();
        let prompter =
            ScriptedPrompter::new(vec![StageDecision::Submit(AuthDict::password("@u:x", "pw"))]);
        let mut auth =
            InteractiveAuth::new(client, Box::new(prompter), AuthInputs::default());

        let value = auth.attempt_auth().await.unwrap();
        assert_eq!(value["user_id"], "@u:x");

        let seen = seen_auth.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_none(), "first request carries no auth data");
        let submitted = seen[1].as_ref().unwrap();
        assert_eq!(submitted.kind, Some(AuthType::Password));
        assert_eq!(submitted.session.as_deref(), Some("sess"));
    }

    #[tokio::test]
    async fn stage_error_reprompts_same_stage_with_errcode() {
        let client = ScriptedClient::new(vec![
            Err(password_flow_401()),
            // wrong password: same session, flows repeated, errcode set
            Err(uia_401(json!({
                "session": "sess",
                "flows": [{ "stages": ["m.login.password"] }],
                "errcode": "M_FORBIDDEN",
                "error": "Invalid password",
            }))),
            Ok(json!({ "ok": true })),
        ]);
        let prompter = ScriptedPrompter::new(vec![
            StageDecision::Submit(AuthDict::password("@u:x", "wrong")),
            StageDecision::Submit(AuthDict::password("@u:x", "right")),
        ]);
        let seen_stages = prompter.seen_stages.clone();
        let mut auth =
            InteractiveAuth::new(client, Box::new(prompter), AuthInputs::default());

        auth.attempt_auth().await.unwrap();

        let seen = seen_stages.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, AuthType::Password);
        assert!(!seen[0].1.has_error());
        assert_eq!(seen[1].1.errcode.as_deref(), Some("M_FORBIDDEN"));
        assert_eq!(seen[1].1.error.as_deref(), Some("Invalid password"));
    }

    #[tokio::test]
    async fn non_401_failure_propagates_out() {
        let client = ScriptedClient::new(vec![
            Err(password_flow_401()),
            Err(HttpError::new(500, json!({ "errcode": "M_UNKNOWN" }))),
        ]);
        let prompter =
            ScriptedPrompter::new(vec![StageDecision::Submit(AuthDict::password("@u:x", "pw"))]);
        let mut auth =
            InteractiveAuth::new(client, Box::new(prompter), AuthInputs::default());

        match auth.attempt_auth().await {
            Err(UiaError::Http(err)) => assert_eq!(err.status, 500),
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_rejects_with_the_sentinel() {
        let client = ScriptedClient::new(vec![Err(password_flow_401())]);
        let seen_auth = client.seen_auth.clone();
        let prompter = ScriptedPrompter::new(vec![StageDecision::Cancel]);
        let mut auth =
            InteractiveAuth::new(client, Box::new(prompter), AuthInputs::default());

        assert!(matches!(auth.attempt_auth().await, Err(UiaError::Cancelled)));
        // cancelling must not issue further requests
        assert_eq!(seen_auth.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dummy_stage_auto_submits() {
        let client = ScriptedClient::new(vec![
            Err(uia_401(json!({
                "session": "sess",
                "flows": [{ "stages": ["m.login.dummy"] }],
            }))),
            Ok(json!({ "ok": true })),
        ]);
        let seen_auth = client.seen_auth.clone();
        // no decisions scripted: prompting would hang the test
        let prompter = ScriptedPrompter::new(vec![]);
        let mut auth =
            InteractiveAuth::new(client, Box::new(prompter), AuthInputs::default());

        auth.attempt_auth().await.unwrap();
        let seen = seen_auth.lock().unwrap();
        assert_eq!(seen[1].as_ref().unwrap().kind, Some(AuthType::Dummy));
    }

    #[tokio::test]
    async fn rejects_when_no_flow_matches_inputs() {
        // only an email flow offered, but we hold no email address
        let client = ScriptedClient::new(vec![Err(uia_401(json!({
            "session": "sess",
            "flows": [{ "stages": ["m.login.email.identity"] }],
        })))]);
        let prompter = ScriptedPrompter::new(vec![]);
        let mut auth =
            InteractiveAuth::new(client, Box::new(prompter), AuthInputs::default());

        match auth.attempt_auth().await {
            Err(UiaError::NoFlowFound { available_flows }) => {
                assert_eq!(available_flows.len(), 1);
            }
            other => panic!("expected NoFlowFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resumed_session_sends_session_only_auth_first() {
        let client = ScriptedClient::new(vec![Ok(json!({ "ok": true }))]);
        let seen_auth = client.seen_auth.clone();
        let prompter = ScriptedPrompter::new(vec![]);
        let mut auth = InteractiveAuth::new(client, Box::new(prompter), AuthInputs::default())
            .with_session("resumed");

        auth.attempt_auth().await.unwrap();
        let seen = seen_auth.lock().unwrap();
        let first = seen[0].as_ref().unwrap();
        assert_eq!(first.session.as_deref(), Some("resumed"));
        assert!(first.kind.is_none());
    }

    #[tokio::test]
    async fn email_stage_requests_token_and_fails_attempt_on_token_error() {
        let mut client = ScriptedClient::new(vec![Err(uia_401(json!({
            "session": "sess",
            "flows": [{ "stages": ["m.login.email.identity"] }],
        })))]);
        client.email_token = Some(Err(HttpError::new(400, json!({ "errcode": "M_BAD_JSON" }))));
        let inputs = AuthInputs { email: Some("u@example.org".to_owned()), ..Default::default() };
        let mut auth =
            InteractiveAuth::new(client, Box::new(ScriptedPrompter::new(vec![])), inputs);

        match auth.attempt_auth().await {
            Err(UiaError::Http(err)) => assert_eq!(err.status, 400),
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn background_poll_carries_threepid_creds_and_can_finish_the_attempt() {
        let client = ScriptedClient::new(vec![
            Err(uia_401(json!({
                "session": "sess",
                "flows": [{ "stages": ["m.login.email.identity"] }],
            }))),
            // first poll: link not clicked yet
            Err(uia_401(json!({
                "session": "sess",
                "flows": [{ "stages": ["m.login.email.identity"] }],
            }))),
            // second poll: server accepts
            Ok(json!({ "ok": true })),
        ])
        .with_email_token("sid123");
        let seen_auth = client.seen_auth.clone();
        let token_sessions = client.token_sessions.clone();
        let inputs = AuthInputs {
            email: Some("u@example.org".to_owned()),
            client_secret: Some("secret".to_owned()),
            ..Default::default()
        };
        let mut auth = InteractiveAuth::new(client, Box::new(SilentPrompter), inputs)
            .with_polling();

        let value = auth.attempt_auth().await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(auth.email_sid(), Some("sid123"));
        // the token request belongs to the UIA session the 401 opened
        assert_eq!(*token_sessions.lock().unwrap(), [Some("sess".to_owned())]);

        let seen = seen_auth.lock().unwrap();
        assert_eq!(seen.len(), 3);
        for poll in &seen[1..] {
            let dict = poll.as_ref().unwrap();
            assert_eq!(dict.kind, Some(AuthType::EmailIdentity));
            assert_eq!(dict.session.as_deref(), Some("sess"));
            assert_eq!(
                dict.extra["threepid_creds"],
                json!({ "sid": "sid123", "client_secret": "secret" }),
            );
        }
    }

    #[tokio::test]
    async fn busy_observable_toggles_around_requests() {
        let client = ScriptedClient::new(vec![Ok(json!({ "ok": true }))]);
        let mut auth = InteractiveAuth::new(
            client,
            Box::new(ScriptedPrompter::new(vec![])),
            AuthInputs::default(),
        );
        let busy = auth.busy();
        assert!(!busy.get());
        auth.attempt_auth().await.unwrap();
        assert!(!busy.get());
    }

    #[test]
    fn generated_client_secrets_are_random_alphanumerics() {
        let a = generate_client_secret();
        let b = generate_client_secret();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
