//! browser-tasks CLI
//!
//! Runs tasks from a task book against Chrome, lists the tasks of a book, or prints the task book
//! JSON Schema.

use anyhow::{Context, bail};
use browser_tasks::{BrowserSession, ConnectionOptions, LaunchOptions, PacingOptions, ResolverOptions, RuntimeOptions,
                    TaskBook, TaskRuntime};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "browser-tasks")]
#[command(version)]
#[command(about = "Replay declarative browser tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one or more tasks, in order
    Run {
        /// Task book (JSON)
        book: PathBuf,

        /// Tasks to run
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Record snapshots and action logs below this directory
        #[arg(long, value_name = "DIR")]
        record: Option<PathBuf>,

        /// Launch browser in headed mode (default: headless)
        #[arg(long, short = 'H')]
        headed: bool,

        /// Path to custom browser executable
        #[arg(long, value_name = "PATH")]
        chrome_path: Option<PathBuf>,

        /// WebSocket endpoint URL of an already running browser
        #[arg(long, value_name = "URL")]
        ws_endpoint: Option<String>,

        /// Persistent browser profile directory
        #[arg(long, value_name = "DIR")]
        user_data_dir: Option<PathBuf>,

        /// Attribute to prefer when matching HTML snippets (repeatable; replaces the defaults)
        #[arg(long = "identifying-attribute", value_name = "NAME")]
        identifying_attributes: Vec<String>,

        /// Skip the randomised pauses between keys and actions
        #[arg(long)]
        no_pacing: bool,
    },

    /// List the tasks of a task book
    List {
        book: PathBuf,
    },

    /// Print the task book JSON Schema
    Schema,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Run {
            book,
            tasks,
            record,
            headed,
            chrome_path,
            ws_endpoint,
            user_data_dir,
            identifying_attributes,
            no_pacing,
        } => {
            let book = TaskBook::from_file(&book).with_context(|| format!("loading {}", book.display()))?;
            if let Some(missing) = tasks.iter().find(|task| book.task(task).is_none()) {
                bail!("no task named '{}' in the task book", missing);
            }

            let mut options = RuntimeOptions::new();
            if !identifying_attributes.is_empty() {
                options = options.resolver(ResolverOptions::new().identifying_attributes(identifying_attributes));
            }
            if no_pacing {
                options = options.pacing(PacingOptions::none());
            }
            if let Some(dir) = record {
                options = options.record_dir(dir);
            }

            let mut session = match ws_endpoint {
                Some(url) => BrowserSession::connect(ConnectionOptions::new(url))?,
                None => {
                    let mut launch = LaunchOptions::new().headless(!headed);
                    if let Some(path) = chrome_path {
                        launch = launch.chrome_path(path);
                    }
                    if let Some(dir) = user_data_dir {
                        launch = launch.user_data_dir(dir);
                    }
                    BrowserSession::launch(launch)?
                }
            };

            let mut runtime = TaskRuntime::new(book, options)?;
            for task in &tasks {
                match runtime.execute_task(&mut session, task) {
                    Ok(Some(report)) => {
                        info!("Task '{}': {} iterations, {} actions", task, report.iterations, report.records.len());
                        for result in report.results() {
                            println!("{}", result);
                        }
                        if let Some(path) = report.log_path {
                            info!("Action log written to {}", path.display());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Task '{}' failed: {}", task, e);
                        return Err(e.into());
                    }
                }
            }
        }
        Command::List { book } => {
            let book = TaskBook::from_file(&book).with_context(|| format!("loading {}", book.display()))?;
            for name in book.task_names() {
                let actions = book.task(name).map(|task| task.actions.len()).unwrap_or_default();
                println!("{}\t{} actions", name, actions);
            }
        }
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&TaskBook::json_schema())?);
        }
    }

    Ok(())
}
