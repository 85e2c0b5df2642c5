use crate::config::AppConfig;
use crate::metrics;
use anyhow::Result;
use dashmap::DashMap;
use researchmesh_core::{
    ConfigLoader, FailureKind, Interaction, ResearchTeamFactory, RunCycle, RunState,
    SessionCredential, TeamDescriptor, TeamFactory,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    run_service: Arc<RunService>,
    team: Arc<TeamDescriptor>,
}

impl AppState {
    pub async fn try_new(config: &AppConfig) -> Result<Self> {
        let team_config = ConfigLoader::load(config.config_path.clone())?;
        let factory = ResearchTeamFactory::new(team_config);
        let team = factory.descriptor();
        info!(
            team = %team.name,
            model = %team.model,
            members = team.members.len(),
            "research team configured"
        );

        let run_service = RunService::new(Arc::new(factory), config.max_concurrency)
            .with_session_idle(config.session_idle);
        Ok(Self::from_service(run_service, team))
    }

    pub fn new(factory: Arc<dyn TeamFactory>, team: TeamDescriptor, max_concurrency: usize) -> Self {
        Self::from_service(RunService::new(factory, max_concurrency), team)
    }

    pub fn from_service(run_service: RunService, team: TeamDescriptor) -> Self {
        Self {
            run_service: Arc::new(run_service),
            team: Arc::new(team),
        }
    }

    pub fn run_service(&self) -> Arc<RunService> {
        self.run_service.clone()
    }

    pub fn team(&self) -> Arc<TeamDescriptor> {
        self.team.clone()
    }

    pub fn metrics(&self) -> RunMetrics {
        self.run_service.metrics()
    }
}

/// Per-browser-session state. Only the credential outlives a request, and
/// only until the session has been idle for `session_idle`.
#[derive(Debug, Clone)]
struct SessionRecord {
    credential: SessionCredential,
    last_seen: Instant,
}

pub struct RunService {
    cycle: RunCycle,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    running: AtomicUsize,
    sessions: DashMap<String, SessionRecord>,
    session_idle: Duration,
}

impl RunService {
    pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);

    pub fn new(factory: Arc<dyn TeamFactory>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            cycle: RunCycle::new(factory),
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            running: AtomicUsize::new(0),
            sessions: DashMap::new(),
            session_idle: Self::DEFAULT_SESSION_IDLE,
        }
    }

    pub fn with_session_idle(mut self, session_idle: Duration) -> Self {
        self.session_idle = session_idle;
        self
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn has_credential(&self, session_id: &str) -> bool {
        self.credential(session_id).is_some()
    }

    /// Store the session's credential; blank input forgets the session.
    pub fn set_credential(&self, session_id: &str, raw: &str) -> bool {
        self.evict_idle();
        let present = match SessionCredential::from_input(raw) {
            Some(credential) => {
                self.sessions.insert(
                    session_id.to_string(),
                    SessionRecord {
                        credential,
                        last_seen: Instant::now(),
                    },
                );
                true
            }
            None => {
                self.sessions.remove(session_id);
                false
            }
        };
        metrics::credential_updated(session_id, present);
        present
    }

    /// The live credential for `session_id`, refreshing its idle timer.
    fn credential(&self, session_id: &str) -> Option<SessionCredential> {
        self.evict_idle();
        self.sessions.get_mut(session_id).map(|mut record| {
            record.last_seen = Instant::now();
            record.credential.clone()
        })
    }

    fn evict_idle(&self) {
        let before = self.sessions.len();
        let idle = self.session_idle;
        self.sessions.retain(|_, record| record.last_seen.elapsed() < idle);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "idle sessions forgotten");
        }
    }

    /// Run one cycle with the credential stored for `session_id`.
    pub async fn run_for_session(&self, session_id: &str, query: &str) -> RunState {
        let credential = self
            .credential(session_id)
            .map(|credential| credential.expose().to_string())
            .unwrap_or_default();
        let interaction = Interaction::trigger(credential, query);
        self.run(session_id, &interaction).await
    }

    /// Run one cycle. Gating states return at once; admitted runs wait for a
    /// permit when the service is saturated.
    pub async fn run(&self, session_id: &str, interaction: &Interaction) -> RunState {
        let credential = match RunCycle::admit(interaction) {
            Ok(credential) => credential,
            Err(state) => {
                debug!(session_id, state = state.name(), "run gated before queueing");
                return state;
            }
        };

        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                return RunState::Failed {
                    message: err.to_string(),
                    kind: FailureKind::Internal,
                };
            }
        };
        let running = RunningGuard::enter(&self.running);
        metrics::run_started(session_id, running.count, self.semaphore.available_permits());

        let started = Instant::now();
        let mut observer = |state: &RunState| {
            debug!(session_id, state = state.name(), "run state entered");
        };
        let state = self
            .cycle
            .run_admitted(&credential, &interaction.query, &mut observer)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &state {
            RunState::Completed { output } => {
                metrics::run_completed(
                    session_id,
                    output.member_responses.len(),
                    output.usage.total_tokens,
                    elapsed_ms,
                );
            }
            RunState::Failed { message, kind } => {
                metrics::run_failed(session_id, kind.as_str(), message, elapsed_ms);
            }
            _ => {}
        }

        state
    }

    pub fn metrics(&self) -> RunMetrics {
        RunMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.semaphore.available_permits(),
            running_runs: self.running.load(Ordering::SeqCst),
            total_sessions: self.sessions.len(),
        }
    }
}

/// Counts a run as in flight until dropped, including when the request is cancelled.
struct RunningGuard<'a> {
    running: &'a AtomicUsize,
    count: usize,
}

impl<'a> RunningGuard<'a> {
    fn enter(running: &'a AtomicUsize) -> Self {
        let count = running.fetch_add(1, Ordering::SeqCst) + 1;
        Self { running, count }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_runs: usize,
    pub total_sessions: usize,
}
