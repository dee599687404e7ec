use clap::{Arg, ArgMatches, Command};
use color_eyre::Result;
use serde::Serialize;
use std::sync::Arc;

mod adapters;
mod application;
mod domain;
mod ports;

use adapters::{
    api::{HttpClient, HttpTaskApi},
    config::FileConfigStore,
    tui::{run_tui, App},
};
use application::{AppError, IntentOutcome, StateManager, TaskStats};
use domain::{Filter, Task, TaskId};
use ports::{AppConfig, ConfigStore};

const API_URL_ENV: &str = "TODO_API_URL";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListOutput<'a> {
    filter: Filter,
    tasks: &'a [Task],
    stats: TaskStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn cli() -> Command {
    let task_id = || {
        Arg::new("task_id")
            .help("Task ID")
            .required(true)
            .index(1)
    };

    Command::new("todo-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A terminal to-do list with optimistic updates")
        .long_about("A keyboard-driven to-do list backed by a REST task API.\n\nRun without a subcommand to start the terminal UI.")
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .value_name("URL")
                .help(format!("Task API base URL (can also be set via {API_URL_ENV} env var)"))
                .global(true),
        )
        .subcommand(
            Command::new("tasks")
                .about("Task operations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list").about("List tasks as JSON").arg(
                        Arg::new("filter")
                            .long("filter")
                            .short('f')
                            .value_name("FILTER")
                            .help("all, incomplete or completed")
                            .default_value("all"),
                    ),
                )
                .subcommand(
                    Command::new("add").about("Create a task").arg(
                        Arg::new("text")
                            .help("Task text")
                            .required(true)
                            .index(1),
                    ),
                )
                .subcommand(
                    Command::new("edit")
                        .about("Change the text of a task")
                        .arg(task_id())
                        .arg(
                            Arg::new("text")
                                .help("New task text")
                                .required(true)
                                .index(2),
                        ),
                )
                .subcommand(Command::new("done").about("Mark a task as completed").arg(task_id()))
                .subcommand(Command::new("undone").about("Mark a task as incomplete").arg(task_id()))
                .subcommand(Command::new("rm").about("Delete a task").arg(task_id()))
                .subcommand(Command::new("complete-all").about("Mark every task as completed"))
                .subcommand(Command::new("reopen-all").about("Mark every task as incomplete"))
                .subcommand(Command::new("clear-completed").about("Delete all completed tasks")),
        )
        .subcommand(
            Command::new("config")
                .about("Configuration")
                .subcommand_required(true)
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(Command::new("save").about("Persist the effective configuration")),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize color-eyre for better error reporting
    color_eyre::install()?;

    let matches = cli().get_matches();

    // Load configuration
    let config_store = FileConfigStore::new()?;
    let mut config = config_store.load_config().await?;

    // Override with command line arguments or environment variables
    if let Some(url) = matches.get_one::<String>("api-url") {
        config.base_url = url.clone();
    } else if let Ok(url) = std::env::var(API_URL_ENV) {
        config.base_url = url;
    }

    // Initialize logging to file; the terminal UI owns stdout
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .init();

    tracing::info!("Using task API at {}", config.base_url);

    // Create dependencies
    let client = HttpClient::new(&config.base_url, config.request_timeout_seconds)
        .map_err(AppError::from)?;
    let api = Arc::new(HttpTaskApi::new(client));
    let state_manager = Arc::new(StateManager::new(api, &config));

    // Handle subcommands
    match matches.subcommand() {
        Some(("tasks", tasks_matches)) => run_tasks_command(&state_manager, tasks_matches).await?,
        Some(("config", config_matches)) => {
            run_config_command(&config_store, &config, config_matches).await?
        }
        None => {
            // Default behavior - run TUI
            let app = App::new(state_manager);

            if let Err(e) = run_tui(app).await {
                eprintln!("❌ Application error: {e}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("❌ Unknown command");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run_tasks_command(state_manager: &StateManager, matches: &ArgMatches) -> Result<()> {
    let task_id = |m: &ArgMatches| -> TaskId {
        m.get_one::<String>("task_id")
            .map(|id| TaskId::from(id.as_str()))
            .unwrap_or_else(|| TaskId::from(""))
    };

    if let Some(("list", list_matches)) = matches.subcommand() {
        let filter: Filter = list_matches
            .get_one::<String>("filter")
            .map(|raw| raw.parse())
            .transpose()
            .map_err(AppError::from)?
            .unwrap_or_default();

        state_manager.activate_filter(filter).await;
        return print_view(state_manager);
    }

    // Mutations need the collection they target in the cache.
    state_manager.set_filter(Filter::All);
    if state_manager.ensure_loaded().await == IntentOutcome::Failed {
        return fail(state_manager, "Failed to load tasks");
    }

    let (outcome, strict) = match matches.subcommand() {
        Some(("add", m)) => {
            let text = m.get_one::<String>("text").map(String::as_str).unwrap_or("");
            (state_manager.create_task(text).await, true)
        }
        Some(("edit", m)) => {
            let text = m.get_one::<String>("text").map(String::as_str).unwrap_or("");
            (state_manager.update_task(&task_id(m), text).await, true)
        }
        Some(("done", m)) => (state_manager.toggle_complete(&task_id(m), true).await, true),
        Some(("undone", m)) => (state_manager.toggle_complete(&task_id(m), false).await, true),
        Some(("rm", m)) => (state_manager.delete_task(&task_id(m)).await, true),
        Some(("complete-all", _)) => (state_manager.toggle_all(true).await, false),
        Some(("reopen-all", _)) => (state_manager.toggle_all(false).await, false),
        Some(("clear-completed", _)) => (state_manager.delete_completed().await, false),
        _ => {
            eprintln!("❌ Unknown tasks subcommand");
            std::process::exit(1);
        }
    };

    match outcome {
        IntentOutcome::Applied => print_view(state_manager),
        IntentOutcome::Failed => fail(state_manager, "Operation failed"),
        IntentOutcome::Ignored if strict => {
            eprintln!("❌ Nothing changed: unknown task id or empty text");
            std::process::exit(1);
        }
        IntentOutcome::Ignored => {
            eprintln!("Nothing to do");
            print_view(state_manager)
        }
    }
}

async fn run_config_command(
    config_store: &FileConfigStore,
    config: &AppConfig,
    matches: &ArgMatches,
) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => {
            let json = serde_json::json!({
                "path": config_store.path(),
                "base_url": config.base_url,
                "request_timeout_seconds": config.request_timeout_seconds,
                "stale_after_seconds": config.stale_after_seconds,
                "serialize_task_mutations": config.serialize_task_mutations,
                "log_file": config.log_file,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Some(("save", _)) => {
            config_store.save_config(config).await?;
            println!("Saved {}", config_store.path().display());
        }
        _ => {
            eprintln!("❌ Unknown config subcommand");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn print_view(state_manager: &StateManager) -> Result<()> {
    let view = state_manager.view();
    let output = ListOutput {
        filter: view.filter,
        tasks: &view.tasks,
        stats: view.stats,
        error: view.display_error.as_deref(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn fail(state_manager: &StateManager, fallback: &str) -> Result<()> {
    let view = state_manager.view();
    eprintln!(
        "❌ {}",
        view.display_error.as_deref().unwrap_or(fallback)
    );
    std::process::exit(1);
}
