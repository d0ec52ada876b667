//! Reddit Watch Hive — process entry point.
//!
//! One binary, three subcommands:
//! - `migrate`: open the database and ensure the schema exists, then exit.
//! - `serve <agent-type>`: boot the HTTP server for one agent
//!   (`retrieval` | `filter` | `summarise` | `alert` | `coordinator`).
//! - `run-cycle`: run a single monitoring cycle against a running
//!   coordinator's peers and print the outcome.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn, Level};

use reddit_watch_hive::agent_card::SkillTable;
use reddit_watch_hive::agents::collaborators::{HttpContentSource, HttpSummariser, KeywordClassifier};
use reddit_watch_hive::agents::{alert_agent, coordinator_agent, filter, retrieval, summarise};
use reddit_watch_hive::alerting::Alerter;
use reddit_watch_hive::app_state::AppState;
use reddit_watch_hive::coordinator;
use reddit_watch_hive::http_client::RemoteInvoker;
use reddit_watch_hive::infrastructure::circuit_breaker::CircuitBreakerRegistry;
use reddit_watch_hive::recovery_daemon::RecoveryDaemon;
use reddit_watch_hive::registry::{InMemoryRegistry, RedisRegistry, RegistryEntry, ServiceRegistry, SharedRegistry};
use reddit_watch_hive::server;
use reddit_watch_hive::store::{AgentStore, AlertStore, DedupStore, Db, RecoveryStore, TaskStore, WorkflowStore};
use reddit_watch_hive::utils::auth::AuthManager;
use reddit_watch_hive::utils::config::Config;
use reddit_watch_hive::utils::rate_limiter::RateLimiter;

#[derive(Parser)]
#[command(name = "reddit-watch-hive", version, about = "Reddit monitoring agent fleet")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure the database schema exists, then exit.
    Migrate,
    /// Boot the HTTP server for one agent type.
    Serve {
        #[arg(value_enum)]
        agent_type: AgentTypeArg,
    },
    /// Run one monitoring cycle against the configured coordinator's peers.
    RunCycle {
        #[arg(long)]
        topics: Vec<String>,
        #[arg(long)]
        subreddits: Vec<String>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum AgentTypeArg {
    Retrieval,
    Filter,
    Summarise,
    Alert,
    Coordinator,
}

impl AgentTypeArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::Filter => "filter",
            Self::Summarise => "summarise",
            Self::Alert => "alert",
            Self::Coordinator => "coordinator",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    init_logging(&config.logging.level);

    let exit_code = match run(cli, config).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Migrate => migrate(&config).await,
        Command::Serve { agent_type } => serve(config, agent_type.as_str()).await,
        Command::RunCycle { topics, subreddits } => run_cycle(config, topics, subreddits).await,
    }
}

async fn migrate(config: &Config) -> anyhow::Result<()> {
    Db::open(&config.database.database_url).await?;
    info!("database schema is up to date");
    Ok(())
}

fn build_registry(config: &Config) -> anyhow::Result<SharedRegistry> {
    if config.registry.redis_url.is_empty() {
        Ok(Arc::new(InMemoryRegistry::new()))
    } else {
        match RedisRegistry::new(&config.registry.redis_url) {
            Ok(registry) => Ok(Arc::new(registry)),
            Err(err) => {
                warn!(error = %err, "falling back to in-memory registry");
                Ok(Arc::new(InMemoryRegistry::new()))
            }
        }
    }
}

async fn serve(config: Config, agent_type: &str) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let db = Db::open(&config.database.database_url).await?;
    let http_client = reqwest::Client::new();
    let registry = build_registry(&config)?;
    let breakers = Arc::new(CircuitBreakerRegistry::new(
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.recovery_timeout_secs,
    ));
    let auth = Arc::new(AuthManager::new(config.auth.a2a_api_key.clone(), &config.auth.jwt_secret));
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    let task_store = TaskStore::new(db.clone());
    let workflow_store = WorkflowStore::new(db.clone());
    let agent_store = AgentStore::new(db.clone());
    let recovery_store = RecoveryStore::new(db.clone());
    let dedup_store = DedupStore::new(db.clone());
    let alert_store = AlertStore::new(db.clone());

    let base_url = config
        .agent_url(agent_type)
        .unwrap_or(&config.server.coordinator_agent_url)
        .to_string();

    let (card, skills) = build_skills(&config, agent_type, &http_client, dedup_store.clone(), alert_store.clone(), &base_url)?;

    let mut state = AppState {
        config: config.clone(),
        agent_type: agent_type.to_string(),
        card,
        skills,
        task_store,
        workflow_store,
        agent_store,
        recovery_store,
        dedup_store,
        alert_store,
        registry: registry.clone(),
        breakers: breakers.clone(),
        auth,
        rate_limiter,
        http_client: http_client.clone(),
    };

    let coordinator_invoker = if agent_type == "coordinator" {
        let invoker = Arc::new(RemoteInvoker::new(
            http_client.clone(),
            registry.clone(),
            breakers.clone(),
            config.auth.a2a_api_key.clone(),
        ));
        let (coordinator_card, coordinator_skills) = coordinator_agent::build(state.clone(), invoker.clone(), &base_url);
        state.card = coordinator_card;
        state.skills = merge_skills(state.skills, coordinator_skills);
        Some(invoker)
    } else {
        None
    };
    let state = state;

    registry
        .register(
            agent_type,
            RegistryEntry {
                url: base_url.clone(),
                name: state.card.name.clone(),
                version: state.card.version.clone(),
                heartbeat_at: chrono::Utc::now(),
            },
            config.registry.heartbeat_interval_secs * 2,
        )
        .await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_heartbeat(registry.clone(), agent_type.to_string(), base_url.clone(), state.card.clone(), config.registry.heartbeat_interval_secs, stop_rx.clone());

    let background_handles = if let Some(invoker) = coordinator_invoker {
        let recovery = RecoveryDaemon::new(state.clone(), Duration::from_secs(config.workflow.recovery_check_interval_secs));
        let recovery_stop = stop_rx.clone();
        let recovery_handle = tokio::spawn(recovery.run(recovery_stop));

        let scheduler_state = state.clone();
        let monitoring_interval_hours = config.workflow.monitoring_interval_hours;
        let scheduler_stop = stop_rx.clone();
        let scheduler_handle = tokio::spawn(coordinator_agent::run_scheduler(
            scheduler_state,
            invoker,
            monitoring_interval_hours,
            scheduler_stop,
        ));
        Some((recovery_handle, scheduler_handle))
    } else {
        None
    };

    let listener = tokio::net::TcpListener::bind((config.server.a2a_host.as_str(), config.server.a2a_port)).await?;
    info!(agent_type, addr = %listener.local_addr()?, "agent listening");

    let router = server::create_router(state);
    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal).await?;

    let _ = stop_tx.send(true);
    if let Some((recovery_handle, scheduler_handle)) = background_handles {
        let _ = recovery_handle.await;
        let _ = scheduler_handle.await;
    }
    registry.deregister(agent_type).await?;
    Ok(())
}

fn spawn_heartbeat(
    registry: SharedRegistry,
    agent_type: String,
    url: String,
    card: reddit_watch_hive::agent_card::AgentCard,
    interval_secs: u64,
    mut stop: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let entry = RegistryEntry {
                        url: url.clone(),
                        name: card.name.clone(),
                        version: card.version.clone(),
                        heartbeat_at: chrono::Utc::now(),
                    };
                    if let Err(err) = registry.register(&agent_type, entry, interval_secs * 2).await {
                        warn!(error = %err, "heartbeat registration failed");
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
    });
}

fn merge_skills(mut base: SkillTable, other: SkillTable) -> SkillTable {
    for name in other.names() {
        if let Some(handler) = other.get(&name) {
            base.register(name, handler);
        }
    }
    base
}

#[allow(clippy::too_many_arguments)]
fn build_skills(
    config: &Config,
    agent_type: &str,
    http_client: &reqwest::Client,
    dedup_store: DedupStore,
    alert_store: AlertStore,
    base_url: &str,
) -> anyhow::Result<(reddit_watch_hive::agent_card::AgentCard, SkillTable)> {
    match agent_type {
        "retrieval" => {
            let content_source: Arc<dyn reddit_watch_hive::agents::collaborators::ContentSource> =
                Arc::new(HttpContentSource::new(http_client.clone(), config.server.retrieval_agent_url.clone()));
            Ok(retrieval::build(content_source, dedup_store, config.workflow.worker_pool_size, base_url))
        }
        "filter" => {
            let classifier: Arc<dyn reddit_watch_hive::agents::collaborators::Classifier> =
                Arc::new(KeywordClassifier { relevance_threshold: config.workflow.relevance_threshold });
            Ok(filter::build(classifier, config.workflow.relevance_threshold, base_url))
        }
        "summarise" => {
            let summariser: Arc<dyn reddit_watch_hive::agents::collaborators::Summariser> =
                Arc::new(HttpSummariser::new(http_client.clone(), config.server.summarise_agent_url.clone()));
            Ok(summarise::build(summariser, base_url))
        }
        "alert" => {
            let alerter = Arc::new(Alerter::new(alert_store, config.alert.clone(), http_client.clone()));
            Ok(alert_agent::build(alerter, base_url))
        }
        "coordinator" => {
            let card = reddit_watch_hive::agent_card::AgentCard::new(
                "coordinator-agent",
                "Drives the four-stage Reddit monitoring pipeline",
                base_url,
                vec![],
            );
            Ok((card, SkillTable::new()))
        }
        other => anyhow::bail!("unknown agent type: {other}"),
    }
}

async fn run_cycle(config: Config, topics: Vec<String>, subreddits: Vec<String>) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let db = Db::open(&config.database.database_url).await?;
    let http_client = reqwest::Client::new();
    let registry = build_registry(&config)?;
    let breakers = Arc::new(CircuitBreakerRegistry::new(
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.recovery_timeout_secs,
    ));
    let auth = Arc::new(AuthManager::new(config.auth.a2a_api_key.clone(), &config.auth.jwt_secret));
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    let state = AppState {
        config: config.clone(),
        agent_type: "coordinator".to_string(),
        card: reddit_watch_hive::agent_card::AgentCard::new("coordinator-agent", "ad-hoc run-cycle invocation", &config.server.coordinator_agent_url, vec![]),
        skills: SkillTable::new(),
        task_store: TaskStore::new(db.clone()),
        workflow_store: WorkflowStore::new(db.clone()),
        agent_store: AgentStore::new(db.clone()),
        recovery_store: RecoveryStore::new(db.clone()),
        dedup_store: DedupStore::new(db.clone()),
        alert_store: AlertStore::new(db.clone()),
        registry: registry.clone(),
        breakers: breakers.clone(),
        auth,
        rate_limiter,
        http_client: http_client.clone(),
    };

    let invoker = Arc::new(RemoteInvoker::new(http_client, registry, breakers, config.auth.a2a_api_key.clone()));

    let topics = if topics.is_empty() { config.workflow.reddit_topics.clone() } else { topics };
    let subreddits = if subreddits.is_empty() { config.workflow.reddit_subreddits.clone() } else { subreddits };

    let outcome = coordinator::run_monitoring_cycle(&state, &invoker, &topics, &subreddits).await?;
    println!(
        "{}",
        serde_json::json!({
            "workflow_id": outcome.workflow_id,
            "status": outcome.status.as_str(),
            "alerts_sent": outcome.alerts_sent,
        })
    );
    Ok(())
}
