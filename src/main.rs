use anyhow::Context;
use clap::Parser;
use small_roster::config::cli::Command;
use small_roster::config::StoreKind;
use small_roster::core::{CatalogDirectory, EnrollmentStore};
use small_roster::utils::error::ErrorSeverity;
use small_roster::utils::{logger, validation::Validate};
use small_roster::{
    CliConfig, EnrollmentEngine, InMemoryStore, JsonFileStore, LocalStorage, RestStore, TomlConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = match TomlConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if config.json_logs() {
        logger::init_json_logger(config.log_level());
    } else {
        logger::init_cli_logger(cli.verbose, config.log_level());
    }
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let result = match config.store_kind()? {
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store; changes are discarded on exit");
            run(InMemoryStore::new(), &config, &cli).await
        }
        StoreKind::Json => {
            let storage = LocalStorage::new(config.store.data_dir());
            let store = JsonFileStore::open(storage, config.store.file_name())
                .await
                .with_context(|| format!("opening roster document in {}", config.store.data_dir()))?;
            run(Arc::new(store), &config, &cli).await
        }
        StoreKind::Rest => {
            let endpoint = config.store.endpoint.as_deref().context("store.endpoint is required")?;
            let api_key = config.store.api_key.as_deref().context("store.api_key is required")?;
            let store = RestStore::new(endpoint, api_key, config.store.timeout_seconds())?;
            run(store, &config, &cli).await
        }
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(
                "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low | ErrorSeverity::High => 1,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::Critical => 3,
            };
            std::process::exit(exit_code);
        }
    }
}

async fn run<S>(store: S, config: &TomlConfig, cli: &CliConfig) -> small_roster::Result<i32>
where
    S: CatalogDirectory + EnrollmentStore + Clone,
{
    let engine = EnrollmentEngine::with_config(store.clone(), store, config.engine.clone());

    if let Some((operation, subject, students, note)) = cli.command.bulk_request() {
        let outcome = engine.bulk_apply(&operation, students, subject, note).await;

        if cli.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            let icon = if outcome.is_complete_success() { "✅" } else { "⚠️" };
            println!("{} {}: {}", icon, operation.name(), outcome.summary());
            for failure in &outcome.failures {
                println!("  ❌ {} [{}] {}", failure.student_id, failure.kind, failure.message);
            }
        }
        return Ok(if outcome.is_complete_success() { 0 } else { 2 });
    }

    match &cli.command {
        Command::Roster {
            subject,
            available: true,
        } => {
            let students = engine.available_students(subject).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else {
                println!("📋 {} available student(s) for {}", students.len(), subject);
                for student in students {
                    println!("  {}  {}  <{}>", student.id, student.name, student.email);
                }
            }
            Ok(0)
        }
        Command::Roster {
            subject,
            available: false,
        } => {
            let roster = engine.get_roster(subject).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&roster)?);
            } else {
                println!("📋 {} enrolled student(s) in {}", roster.len(), subject);
                for view in &roster.views {
                    println!(
                        "  {}  {} / {}  attendance {:.0}%",
                        view.student_id, view.level_name, view.group_name, view.attendance
                    );
                }
            }
            Ok(0)
        }
        Command::Groups { subject, level } => {
            let groups = engine.open_groups(subject, level).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else if groups.is_empty() {
                println!("⚠️ No group in level {} of {} has free seats", level, subject);
            } else {
                println!("📋 {} open group(s) in level {} of {}", groups.len(), level, subject);
                for group in &groups {
                    println!(
                        "  {}  {}  {}/{}",
                        group.id, group.name, group.current_students, group.max_students
                    );
                }
            }
            Ok(0)
        }
        Command::Check { subject } => {
            let drift = engine.check_counters(subject).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&drift)?);
            } else if drift.is_empty() {
                println!("✅ Counters for {} match the roster", subject);
            } else {
                for entry in &drift {
                    println!(
                        "  ❌ {} records {} but has {} enrollment(s)",
                        entry.target, entry.recorded, entry.actual
                    );
                }
            }
            Ok(if drift.is_empty() { 0 } else { 3 })
        }
        Command::Enroll { .. } | Command::Transfer { .. } | Command::Remove { .. } => Ok(0),
    }
}
