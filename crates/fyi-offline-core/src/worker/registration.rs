use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{ControlMessage, InstallError, LifecycleDirective, RequestOutcome, ServiceWorker};
use crate::models::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed, waiting for the previous version's clients to go away.
    Installed,
    Activating,
    Activated,
    /// Install failed; the worker is never used.
    Redundant,
}

#[derive(Debug)]
struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
    has_predecessor: bool,
    controlling: bool,
}

/// Host-side lifecycle of a single worker version.
///
/// Requests only reach the worker once it is activated and has claimed
/// clients; before that they pass through untouched.
pub struct Registration {
    worker: Arc<dyn ServiceWorker>,
    lifecycle: RwLock<Lifecycle>,
}

impl Registration {
    /// `has_predecessor` is true when an older version still serves clients,
    /// in which case a newly installed worker waits unless told to skip.
    pub fn new(worker: Arc<dyn ServiceWorker>, has_predecessor: bool) -> Self {
        Self::with_lifecycle(
            worker,
            Lifecycle {
                state: WorkerState::Parsed,
                skip_waiting: false,
                has_predecessor,
                controlling: false,
            },
        )
    }

    /// A version that was activated by an earlier run and whose cache is
    /// already populated. It controls clients from the start; a later
    /// failed install leaves it in control.
    pub fn resume(worker: Arc<dyn ServiceWorker>) -> Self {
        Self::with_lifecycle(
            worker,
            Lifecycle {
                state: WorkerState::Activated,
                skip_waiting: false,
                has_predecessor: false,
                controlling: true,
            },
        )
    }

    fn with_lifecycle(worker: Arc<dyn ServiceWorker>, lifecycle: Lifecycle) -> Self {
        Self {
            worker,
            lifecycle: RwLock::new(lifecycle),
        }
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.read().await.state
    }

    pub async fn is_controlling(&self) -> bool {
        self.lifecycle.read().await.controlling
    }

    /// Run install, then activate right away if nothing needs to be waited for.
    pub async fn install(&self) -> Result<WorkerState, InstallError> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if !lifecycle.controlling {
                lifecycle.state = WorkerState::Installing;
            }
        }

        let outcome = match self.worker.on_install().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let mut lifecycle = self.lifecycle.write().await;
                if lifecycle.controlling {
                    warn!(error = %e, "Install failed, keeping the cached version in control");
                    lifecycle.state = WorkerState::Activated;
                } else {
                    warn!(error = %e, "Install failed, worker is redundant");
                    lifecycle.state = WorkerState::Redundant;
                }
                return Err(e);
            }
        };

        let activate_now = {
            let mut lifecycle = self.lifecycle.write().await;
            lifecycle.skip_waiting |= outcome.skip_waiting;
            let activate_now = lifecycle.skip_waiting || !lifecycle.has_predecessor;
            lifecycle.state = if activate_now {
                WorkerState::Activating
            } else {
                WorkerState::Installed
            };
            activate_now
        };

        if activate_now {
            self.activate().await;
        } else {
            info!(cache = %outcome.cache_name, "Installed, waiting for previous version");
        }
        Ok(self.state().await)
    }

    /// Deliver a control message from the page.
    pub async fn post_message(&self, message: ControlMessage) -> WorkerState {
        match self.worker.on_control_message(message) {
            LifecycleDirective::SkipWaiting => {
                let waiting = {
                    let mut lifecycle = self.lifecycle.write().await;
                    lifecycle.skip_waiting = true;
                    let waiting = lifecycle.state == WorkerState::Installed;
                    if waiting {
                        lifecycle.state = WorkerState::Activating;
                    }
                    waiting
                };
                if waiting {
                    self.activate().await;
                }
            }
        }
        self.state().await
    }

    /// Route a request through the worker if it controls clients.
    pub async fn handle_request(&self, request: &Request) -> RequestOutcome {
        if !self.is_controlling().await {
            return RequestOutcome::passthrough();
        }
        self.worker.on_request(request).await
    }

    /// Callers move the state to `Activating` under the same lock that
    /// decided to activate, so `on_activate` runs once per install.
    async fn activate(&self) {
        // Cleanup failures do not block activation; stale buckets go next time.
        let claim_clients = match self.worker.on_activate().await {
            Ok(outcome) => outcome.claim_clients,
            Err(e) => {
                warn!(error = %e, "Cache cleanup failed during activation");
                true
            }
        };

        let mut lifecycle = self.lifecycle.write().await;
        lifecycle.state = WorkerState::Activated;
        lifecycle.has_predecessor = false;
        lifecycle.controlling |= claim_clients;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::models::Response;
    use crate::worker::{ActivateOutcome, InstallOutcome};

    struct ScriptedWorker {
        skip_waiting: bool,
        fail_install: bool,
        activations: AtomicUsize,
    }

    impl ScriptedWorker {
        fn new(skip_waiting: bool) -> Self {
            Self {
                skip_waiting,
                fail_install: false,
                activations: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ServiceWorker for ScriptedWorker {
        async fn on_install(&self) -> Result<InstallOutcome, InstallError> {
            if self.fail_install {
                return Err(InstallError::SeedStatus {
                    url: "https://fyi.example/app.js".into(),
                    status: 500,
                });
            }
            Ok(InstallOutcome {
                cache_name: "v2".into(),
                seeded: 0,
                skip_waiting: self.skip_waiting,
            })
        }

        async fn on_activate(&self) -> Result<ActivateOutcome> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            // Give a concurrent message a chance to interleave
            tokio::task::yield_now().await;
            Ok(ActivateOutcome {
                deleted: vec![],
                claim_clients: true,
            })
        }

        async fn on_request(&self, _request: &Request) -> RequestOutcome {
            RequestOutcome::respond(Response::new(200, "from worker"))
        }

        fn on_control_message(&self, _message: ControlMessage) -> LifecycleDirective {
            LifecycleDirective::SkipWaiting
        }
    }

    fn request() -> Request {
        Request::get(Url::parse("https://fyi.example/app.js").unwrap())
    }

    #[tokio::test]
    async fn test_skip_waiting_on_install_activates_immediately() {
        let worker = Arc::new(ScriptedWorker::new(true));
        let reg = Registration::new(worker.clone(), true);

        assert_eq!(reg.install().await.unwrap(), WorkerState::Activated);
        assert!(reg.is_controlling().await);
        assert_eq!(worker.activations.load(Ordering::SeqCst), 1);
        assert!(!reg.handle_request(&request()).await.is_passthrough());
    }

    #[tokio::test]
    async fn test_waits_for_predecessor_until_message() {
        let worker = Arc::new(ScriptedWorker::new(false));
        let reg = Registration::new(worker.clone(), true);

        assert_eq!(reg.install().await.unwrap(), WorkerState::Installed);
        assert!(reg.handle_request(&request()).await.is_passthrough());

        assert_eq!(reg.post_message(ControlMessage::SkipWaiting).await, WorkerState::Activated);
        assert!(!reg.handle_request(&request()).await.is_passthrough());

        // A second message does not activate again
        reg.post_message(ControlMessage::SkipWaiting).await;
        assert_eq!(worker.activations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_install_activates_without_skip_waiting() {
        let reg = Registration::new(Arc::new(ScriptedWorker::new(false)), false);
        assert_eq!(reg.install().await.unwrap(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant() {
        let mut worker = ScriptedWorker::new(true);
        worker.fail_install = true;
        let reg = Registration::new(Arc::new(worker), false);

        assert!(reg.install().await.is_err());
        assert_eq!(reg.state().await, WorkerState::Redundant);
        assert!(reg.handle_request(&request()).await.is_passthrough());
    }

    #[tokio::test]
    async fn test_concurrent_skip_waiting_activates_once() {
        let worker = Arc::new(ScriptedWorker::new(false));
        let reg = Registration::new(worker.clone(), true);
        assert_eq!(reg.install().await.unwrap(), WorkerState::Installed);

        let (a, b) = tokio::join!(
            reg.post_message(ControlMessage::SkipWaiting),
            reg.post_message(ControlMessage::SkipWaiting)
        );
        assert_eq!(worker.activations.load(Ordering::SeqCst), 1);
        assert!(a == WorkerState::Activated || b == WorkerState::Activated);
        assert_eq!(reg.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_resumed_registration_controls_before_install() {
        let reg = Registration::resume(Arc::new(ScriptedWorker::new(true)));
        assert_eq!(reg.state().await, WorkerState::Activated);
        assert!(!reg.handle_request(&request()).await.is_passthrough());
    }

    #[tokio::test]
    async fn test_failed_reinstall_keeps_resumed_version_in_control() {
        let mut worker = ScriptedWorker::new(true);
        worker.fail_install = true;
        let worker = Arc::new(worker);
        let reg = Registration::resume(worker.clone());

        assert!(reg.install().await.is_err());
        assert_eq!(reg.state().await, WorkerState::Activated);
        assert!(reg.is_controlling().await);
        assert!(!reg.handle_request(&request()).await.is_passthrough());
        assert_eq!(worker.activations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_reinstall_runs_cleanup_again() {
        let worker = Arc::new(ScriptedWorker::new(true));
        let reg = Registration::resume(worker.clone());

        assert_eq!(reg.install().await.unwrap(), WorkerState::Activated);
        assert!(reg.is_controlling().await);
        assert_eq!(worker.activations.load(Ordering::SeqCst), 1);
    }
}
