//! SSO and fallback-web stage coordination.
//!
//! Both stage kinds bounce the user out to a server-hosted page in a popup
//! and wait for that page to post the completion message back. The popup
//! itself is a collaborator behind [`PopupProvider`]; this module only owns
//! the lifecycle: build the URL, open, wait, and never leak a window.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;
use url::Url;

use crate::auth::interactive_auth::{StageDecision, StagePrompter};
use crate::auth::types::{AuthDict, AuthType, StageStatus, UiaError};

/// The literal message the fallback/SSO page posts to its opener once the
/// server-side stage is complete.
pub const AUTH_DONE_MESSAGE: &str = "authDone";

/// Where an SSO stage is in its two-phase dance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SsoPhase {
    /// Waiting for the user to start single sign-on.
    PreAuth = 1,
    /// The popup is open; waiting for the user to confirm they finished.
    PostAuth = 2,
}

/// Opens popup windows. Implemented by the embedding client.
pub trait PopupProvider: Send + Sync {
    fn open(&self, url: &Url) -> Box<dyn PopupHandle>;
}

/// One open popup window.
pub trait PopupHandle: Send + Sync {
    /// Resolves when *this* popup posts [`AUTH_DONE_MESSAGE`]; messages from
    /// any other window are not seen here.
    fn wait_auth_done(&self) -> BoxFuture<'_, ()>;

    fn close(&self);
}

/// The server-hosted fallback page completing one UIA stage out-of-band.
pub fn fallback_auth_url(
    homeserver: &Url,
    stage: &AuthType,
    session: &str,
) -> Result<Url, url::ParseError> {
    let mut url = homeserver
        .join(&format!("/_matrix/client/r0/auth/{}/fallback/web", stage.as_str()))?;
    url.query_pairs_mut().append_pair("session", session);
    Ok(url)
}

/// Closes the popup when dropped, so an abandoned prompt cannot leak a
/// window.
struct PopupGuard(Box<dyn PopupHandle>);

impl Drop for PopupGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Drives the SSO stage: the user explicitly starts sign-on (opening the
/// popup), finishes it there, then confirms back in the client.
pub struct SsoStageController {
    provider: Box<dyn PopupProvider>,
    url: Url,
    phase: SsoPhase,
    popup: Option<PopupGuard>,
    observer: Option<Box<dyn Fn(SsoPhase) + Send + Sync>>,
}

impl SsoStageController {
    pub fn new(
        provider: Box<dyn PopupProvider>,
        homeserver: &Url,
        stage: &AuthType,
        session: &str,
    ) -> Result<Self, url::ParseError> {
        debug_assert!(stage.is_sso());
        Ok(SsoStageController {
            provider,
            url: fallback_auth_url(homeserver, stage, session)?,
            phase: SsoPhase::PreAuth,
            popup: None,
            observer: None,
        })
    }

    pub fn set_phase_observer(&mut self, observer: Box<dyn Fn(SsoPhase) + Send + Sync>) {
        self.observer = Some(observer);
    }

    pub fn phase(&self) -> SsoPhase {
        self.phase
    }

    /// Opens the single-sign-on popup and moves to the post-auth phase.
    pub fn start_auth(&mut self) {
        debug!("Opening SSO popup at {}", self.url);
        self.popup = Some(PopupGuard(self.provider.open(&self.url)));
        self.set_phase(SsoPhase::PostAuth);
    }

    /// Waits for the popup to report completion. Optional: the user may
    /// confirm manually without the page ever posting the message.
    pub async fn wait_auth_done(&self) -> Result<(), UiaError> {
        match &self.popup {
            Some(popup) => {
                popup.0.wait_auth_done().await;
                Ok(())
            }
            None => Err(UiaError::BadState("SSO popup was never opened")),
        }
    }

    /// The user says they finished sign-on: closes the popup and yields the
    /// dict to submit (empty; the server ties completion to the session).
    pub fn confirm(&mut self) -> AuthDict {
        self.popup = None;
        AuthDict::default()
    }

    /// Backs out of the stage, closing the popup.
    pub fn cancel(&mut self) {
        self.popup = None;
        self.set_phase(SsoPhase::PreAuth);
    }

    fn set_phase(&mut self, phase: SsoPhase) {
        if self.phase != phase {
            self.phase = phase;
            if let Some(observer) = &self.observer {
                observer(phase);
            }
        }
    }
}

/// A [`StagePrompter`] for stage types with no dedicated handler: opens the
/// generic fallback page and auto-submits once it posts completion.
pub struct FallbackPrompter {
    provider: Box<dyn PopupProvider>,
    homeserver: Url,
}

impl FallbackPrompter {
    pub fn new(provider: Box<dyn PopupProvider>, homeserver: Url) -> Self {
        FallbackPrompter { provider, homeserver }
    }
}

impl StagePrompter for FallbackPrompter {
    fn prompt(
        &self,
        stage: &AuthType,
        _params: Option<&serde_json::Value>,
        status: &StageStatus,
    ) -> BoxFuture<'_, StageDecision> {
        let url = status
            .session
            .as_deref()
            .ok_or(())
            .and_then(|session| {
                fallback_auth_url(&self.homeserver, stage, session).map_err(|_| ())
            });
        async move {
            let Ok(url) = url else {
                // no session or unbuildable URL: nothing we can show
                return StageDecision::Cancel;
            };
            debug!("Opening fallback auth popup at {url}");
            let popup = PopupGuard(self.provider.open(&url));
            popup.0.wait_auth_done().await;
            StageDecision::Submit(AuthDict::default())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct MockPopup {
        auth_done: Notify,
        closed: AtomicBool,
    }

    impl PopupHandle for Arc<MockPopup> {
        fn wait_auth_done(&self) -> BoxFuture<'_, ()> {
            self.auth_done.notified().boxed()
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Relaxed);
        }
    }

    #[derive(Default)]
    struct MockProvider {
        opened: AtomicUsize,
        last_url: std::sync::Mutex<Option<Url>>,
        popup: std::sync::Mutex<Option<Arc<MockPopup>>>,
    }

    impl MockProvider {
        fn popup(&self) -> Arc<MockPopup> {
            self.popup.lock().unwrap().clone().expect("no popup opened")
        }
    }

    impl PopupProvider for Arc<MockProvider> {
        fn open(&self, url: &Url) -> Box<dyn PopupHandle> {
            self.opened.fetch_add(1, Ordering::Relaxed);
            *self.last_url.lock().unwrap() = Some(url.clone());
            let popup = Arc::new(MockPopup::default());
            *self.popup.lock().unwrap() = Some(popup.clone());
            Box::new(popup)
        }
    }

    fn homeserver() -> Url {
        Url::parse("https://matrix.example.org").unwrap()
    }

    #[test]
    fn fallback_url_includes_stage_and_session() {
        let url = fallback_auth_url(&homeserver(), &AuthType::Terms, "sess 1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://matrix.example.org/_matrix/client/r0/auth/m.login.terms/fallback/web?session=sess+1",
        );
    }

    #[tokio::test]
    async fn sso_controller_walks_both_phases() {
        let provider = Arc::new(MockProvider::default());
        let phases = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut controller = SsoStageController::new(
            Box::new(provider.clone()),
            &homeserver(),
            &AuthType::Sso,
            "sess",
        )
        .unwrap();
        let seen = phases.clone();
        controller.set_phase_observer(Box::new(move |phase| seen.lock().unwrap().push(phase)));
        assert_eq!(controller.phase(), SsoPhase::PreAuth);

        controller.start_auth();
        assert_eq!(controller.phase(), SsoPhase::PostAuth);
        assert_eq!(provider.opened.load(Ordering::Relaxed), 1);
        assert!(
            provider.last_url.lock().unwrap().as_ref().unwrap().as_str().contains("m.login.sso"),
        );

        let popup = provider.popup();
        popup.auth_done.notify_one();
        controller.wait_auth_done().await.unwrap();

        let dict = controller.confirm();
        assert_eq!(dict, AuthDict::default());
        assert!(popup.closed.load(Ordering::Relaxed), "confirm must close the popup");
        assert_eq!(*phases.lock().unwrap(), [SsoPhase::PostAuth]);
    }

    #[tokio::test]
    async fn cancelling_sso_closes_the_popup() {
        let provider = Arc::new(MockProvider::default());
        let mut controller = SsoStageController::new(
            Box::new(provider.clone()),
            &homeserver(),
            &AuthType::SsoUnstable,
            "sess",
        )
        .unwrap();
        controller.start_auth();
        let popup = provider.popup();

        controller.cancel();
        assert!(popup.closed.load(Ordering::Relaxed));
        assert_eq!(controller.phase(), SsoPhase::PreAuth);
    }

    #[tokio::test]
    async fn dropping_the_controller_never_leaks_the_popup() {
        let provider = Arc::new(MockProvider::default());
        let mut controller = SsoStageController::new(
            Box::new(provider.clone()),
            &homeserver(),
            &AuthType::Sso,
            "sess",
        )
        .unwrap();
        controller.start_auth();
        let popup = provider.popup();

        drop(controller);
        assert!(popup.closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn fallback_prompter_auto_submits_on_auth_done() {
        let provider = Arc::new(MockProvider::default());
        let prompter = FallbackPrompter::new(Box::new(provider.clone()), homeserver());
        let status = StageStatus { session: Some("sess".to_owned()), ..Default::default() };

        let stage = AuthType::Other("com.example.mfa".to_owned());
        let mut prompt = prompter.prompt(&stage, None, &status);
        // not done yet
        assert!(futures_util::poll!(&mut prompt).is_pending());

        provider.popup().auth_done.notify_one();
        let decision = prompt.await;
        assert_eq!(decision, StageDecision::Submit(AuthDict::default()));
        assert!(provider.popup().closed.load(Ordering::Relaxed));

        let url = provider.last_url.lock().unwrap().clone().unwrap();
        assert!(url.path().contains("com.example.mfa"));
    }

    #[tokio::test]
    async fn fallback_prompter_without_session_cancels() {
        let provider = Arc::new(MockProvider::default());
        let prompter = FallbackPrompter::new(Box::new(provider.clone()), homeserver());
        let decision =
            prompter.prompt(&AuthType::Terms, None, &StageStatus::default()).await;
        assert_eq!(decision, StageDecision::Cancel);
        assert_eq!(provider.opened.load(Ordering::Relaxed), 0);
    }
}
