//! `sc3` command-line interface.

pub mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::adapters::memory::MemorySessionManager;
use crate::adapters::sqlite::{Database, SqliteRecordStore};
use crate::domain::models::{Commission, MissionPlan, RecordFilter};
use crate::domain::ports::{RecordStore, SessionManager, SystemClock};
use crate::services::{
    Config, Doctor, DoctorConfig, EventBus, EventBusConfig, RecoveryConfig, RecoveryManager,
    StateMachine,
};

#[derive(Debug, Parser)]
#[command(name = "sc3", about = "Deterministic multi-agent TDD orchestration", version)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the database and apply migrations.
    Init,
    /// Show commissions, missions, and agents.
    Status {
        /// Limit to one commission.
        #[arg(long)]
        commission: Option<String>,
    },
    /// Run supervision: one tick, or continuously with --watch.
    Doctor {
        #[arg(long)]
        watch: bool,
    },
    /// Reconcile persisted state against live sessions.
    Recover,
    /// Validate a mission's demo token against a worktree.
    DemoCheck {
        worktree: PathBuf,
        mission_id: String,
        /// Mission classification, RED_ALERT or STANDARD_OPS.
        #[arg(long, default_value = "RED_ALERT")]
        classification: String,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Init => init(&config).await,
        Commands::Status { commission } => status(&config, commission.as_deref()).await,
        Commands::Doctor { watch } => doctor(&config, watch).await,
        Commands::Recover => recover(&config).await,
        Commands::DemoCheck {
            worktree,
            mission_id,
            classification,
        } => demo_check(&worktree, &mission_id, &classification).await,
    }
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteRecordStore> {
    let db = Database::open(&config.storage.database_url)
        .await
        .context("opening database")?;
    Ok(db.records())
}

async fn init(config: &Config) -> anyhow::Result<()> {
    open_store(config).await?;
    println!("{}", display::ok(&format!("database ready at {}", config.storage.database_url)));
    Ok(())
}

async fn status(config: &Config, commission: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let filter = RecordFilter {
        parent: commission.map(str::to_string),
        ..RecordFilter::default()
    };
    let mut records = store.list(filter).await?;
    if let Some(id) = commission {
        if let Ok(root) = store.show(id).await {
            records.insert(0, root);
        }
    }
    println!("{}", display::record_table(&records));
    Ok(())
}

fn supervision_stack(
    store: Arc<SqliteRecordStore>,
    config: &Config,
) -> (Arc<EventBus>, Arc<StateMachine>, Arc<dyn SessionManager>) {
    let bus = Arc::new(EventBus::new(EventBusConfig {
        buffer_size: config.event_bus.event_bus_buffer_size,
    }));
    let record_store: Arc<dyn RecordStore> = store;
    let state = Arc::new(StateMachine::new(
        record_store,
        bus.clone(),
        Arc::new(SystemClock),
    ));
    // Live sessions are registered by harness drivers; a standalone CLI
    // run starts from an empty registry.
    let sessions: Arc<dyn SessionManager> = Arc::new(MemorySessionManager::new());
    (bus, state, sessions)
}

async fn doctor(config: &Config, watch: bool) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config).await?);
    let (bus, state, sessions) = supervision_stack(store.clone(), config);
    let doctor = Doctor::new(
        store,
        sessions,
        state,
        bus,
        Arc::new(SystemClock),
        DoctorConfig {
            tick_interval_secs: config.supervision.heartbeat_interval_secs,
            stuck_timeout_secs: config.supervision.stuck_timeout_secs,
        },
    );

    if watch {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            token.cancel();
        });
        doctor.run(&cancel).await;
        return Ok(());
    }

    let report = doctor.tick().await?;
    println!(
        "{}",
        display::ok(&format!(
            "agents={} active={} stuck={:?} orphans={:?} zombies={:?}",
            report.agents_total,
            report.agents_active,
            report.stuck_marked,
            report.orphans_repaired,
            report.zombies_cleaned,
        ))
    );
    Ok(())
}

async fn recover(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config).await?);
    let (bus, state, sessions) = supervision_stack(store.clone(), config);
    let recovery = RecoveryManager::new(
        store,
        sessions,
        state,
        bus,
        Arc::new(SystemClock),
        RecoveryConfig {
            resume_timeout_secs: config.supervision.resume_timeout_secs,
        },
    );
    let report = recovery.recover().await?;
    println!(
        "{}",
        display::ok(&format!(
            "resume={:?} reset={:?} dead={:?} in {}ms",
            report.resume_commission_ids,
            report.missions_reset,
            report.agents_marked_dead,
            report.duration_ms,
        ))
    );
    Ok(())
}

async fn demo_check(worktree: &PathBuf, mission_id: &str, classification: &str) -> anyhow::Result<()> {
    use crate::domain::models::{Classification, ClassifiedRisk};
    use crate::services::DemoValidator;

    let mut mission = MissionPlan::new(mission_id, mission_id);
    mission.classification = ClassifiedRisk {
        tag: Classification::parse(classification)?,
        confidence: 1.0,
        needs_review: false,
        source: Default::default(),
    };
    match DemoValidator::new().validate(worktree, &mission).await {
        Ok(token) => {
            println!(
                "{}",
                display::ok(&format!(
                    "demo token valid: {} ({})",
                    token.front_matter.title, token.front_matter.status
                ))
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", display::warn(&e.to_string()));
            Err(e.into())
        }
    }
}

// Commission intake is used by embedding callers; the CLI surfaces it so
// a parsed PRD can be registered without the planning loop.
pub async fn register_commission(
    store: &dyn RecordStore,
    commission: &Commission,
) -> anyhow::Result<String> {
    use crate::domain::models::{RecordDraft, RecordType};
    let id = store
        .create(RecordDraft {
            id: Some(commission.id.clone()),
            record_type: Some(RecordType::Commission),
            title: commission.title.clone(),
            body: serde_yaml::to_string(commission)?,
            ..RecordDraft::default()
        })
        .await?;
    store
        .set_state(&id, "commission_status", commission.status.as_str())
        .await?;
    Ok(id)
}
