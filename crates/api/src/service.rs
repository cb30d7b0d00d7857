//! Service lifecycle: builds the stores, logs the bot in, runs the worker
//! pool and serves HTTP.
//!
//! Start order: validate form and action, open the database, recover jobs
//! stranded in `running`, log in to the identity provider, start the worker
//! pool, bind the listener. Stop order: HTTP listener, worker pool, database.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, error, info, info_span, warn};

use jobgate_auth::{SessionPolicy, SessionStore};
use jobgate_core::DomainError;
use jobgate_identity::{IdentityBridge, IdentityError, JsonFileSecrets, SecretProvider};
use jobgate_infra::jobs::{
    JobAction, JobStore, JobStoreError, SqliteJobStore, WorkerPool, WorkerPoolConfig,
    WorkerPoolHandle,
};
use jobgate_infra::{Database, DbError, SqliteSessionStore};

use crate::app::{self, AppServices, LoginInfo};
use crate::config::Config;
use crate::form::FormSpec;
use crate::middleware::GuardState;

/// Fatal startup failure.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("no form configured")]
    MissingForm,
    #[error("invalid form: {0}")]
    InvalidForm(#[source] DomainError),
    #[error("no job action configured")]
    MissingAction,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("job recovery failed: {0}")]
    Jobs(#[from] JobStoreError),
    #[error("identity provider login failed: {0}")]
    Identity(#[from] IdentityError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The running pieces, released in reverse dependency order by `stop`.
struct Running {
    addr: SocketAddr,
    db: Database,
    sessions: Arc<dyn SessionStore>,
    jobs: Arc<dyn JobStore>,
    pool: WorkerPoolHandle,
    server: JoinHandle<std::io::Result<()>>,
    shutdown: oneshot::Sender<()>,
}

pub struct Service {
    config: Config,
    form: Option<Arc<FormSpec>>,
    action: Option<Arc<dyn JobAction>>,
    secrets: Option<Arc<dyn SecretProvider>>,
    span: Span,
    running: Option<Running>,
}

impl Service {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            form: None,
            action: None,
            secrets: None,
            span: jobgate_observability::component_span("service", "jobgate"),
            running: None,
        }
    }

    pub fn with_form(mut self, form: FormSpec) -> Self {
        self.form = Some(Arc::new(form));
        self
    }

    pub fn with_action(mut self, action: impl JobAction + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    /// Bot credential source. Defaults to the JSON file named by the config.
    pub fn with_secrets(mut self, secrets: impl SecretProvider + 'static) -> Self {
        self.secrets = Some(Arc::new(secrets));
        self
    }

    /// Root span for every event the service and its components emit.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address the HTTP listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Session store, for the login exchange. Available once started.
    pub fn sessions(&self) -> Option<Arc<dyn SessionStore>> {
        self.running.as_ref().map(|r| r.sessions.clone())
    }

    /// Start every component. Calling `start` on a running service is a
    /// no-op returning the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, StartupError> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let span = self.span.clone();
        let result = self.launch().instrument(span).await;
        match result {
            Ok(running) => {
                let addr = running.addr;
                self.running = Some(running);
                Ok(addr)
            }
            Err(e) => {
                error!(parent: &self.span, error = %e, "service failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<Running, StartupError> {
        let form = self.form.clone().ok_or(StartupError::MissingForm)?;
        form.validate().map_err(StartupError::InvalidForm)?;
        let action = self.action.clone().ok_or(StartupError::MissingAction)?;

        let db = Database::open(&self.config.db_path).await?;
        match self.launch_with(db.clone(), form, action).await {
            Ok(running) => Ok(running),
            Err(e) => {
                db.close().await;
                Err(e)
            }
        }
    }

    async fn launch_with(
        &self,
        db: Database,
        form: Arc<FormSpec>,
        action: Arc<dyn JobAction>,
    ) -> Result<Running, StartupError> {
        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db.clone()));
        let policy = SessionPolicy {
            ttl: self.config.session_ttl,
        };
        let sessions: Arc<dyn SessionStore> =
            Arc::new(SqliteSessionStore::new(db.clone()).with_policy(policy));

        let requeued = jobs.requeue_stranded().await?;
        if requeued > 0 {
            warn!(requeued, "requeued jobs left running by a previous run");
        }

        let secrets = self.secrets.clone().unwrap_or_else(|| {
            Arc::new(JsonFileSecrets::new(self.config.bot_secrets.clone())) as Arc<dyn SecretProvider>
        });
        let client = IdentityBridge::new(&self.config.provider_url, secrets)?
            .with_span(info_span!("identity"))
            .login()
            .await?;
        info!(bot = client.username(), "logged in to identity provider");

        let pool = WorkerPool::new(jobs.clone(), action)
            .with_config(
                WorkerPoolConfig::default()
                    .with_name("jobgate-worker")
                    .with_workers(self.config.workers)
                    .with_poll_interval(self.config.poll_interval),
            )
            .with_span(info_span!("worker_pool"))
            .spawn(client);

        let listener = match TcpListener::bind(self.config.bind).await {
            Ok(listener) => listener,
            Err(source) => {
                pool.shutdown().await;
                return Err(StartupError::Bind {
                    addr: self.config.bind,
                    source,
                });
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                pool.shutdown().await;
                return Err(StartupError::Bind {
                    addr: self.config.bind,
                    source,
                });
            }
        };

        let cookie_name: Arc<str> = Arc::from(self.config.cookie_name.as_str());
        let router = app::build_app(
            AppServices {
                jobs: jobs.clone(),
                form,
            },
            GuardState {
                sessions: sessions.clone(),
                cookie_name: cookie_name.clone(),
                span: info_span!("route_guard"),
            },
            LoginInfo {
                cookie_name,
                provider_url: Arc::from(self.config.provider_url.as_str()),
            },
        );

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                    })
                    .await
            }
            .instrument(info_span!("http")),
        );
        info!(%addr, "listening");

        Ok(Running {
            addr,
            db,
            sessions,
            jobs,
            pool,
            server,
            shutdown,
        })
    }

    /// Stop the listener, then the worker pool (waiting for running jobs),
    /// then close the database. No-op when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        async move {
            let _ = running.shutdown.send(());
            match running.server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "http server failed"),
                Err(e) => error!(error = %e, "http server task ended abnormally"),
            }

            let pool_stats = running.pool.stats();
            running.pool.shutdown().await;
            match running.jobs.stats().await {
                Ok(stats) => info!(
                    processed = pool_stats.jobs_processed,
                    queued = stats.queued,
                    running = stats.running,
                    succeeded = stats.succeeded,
                    failed = stats.failed,
                    "worker pool stopped"
                ),
                Err(e) => warn!(error = %e, "failed to read job stats"),
            }

            running.db.close().await;
            info!("service stopped");
        }
        .instrument(self.span.clone())
        .await
    }
}
