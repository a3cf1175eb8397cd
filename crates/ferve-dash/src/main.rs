use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use ferve_client::adapters::architecture::PROMPT_PRESETS;
use ferve_client::adapters::{
    ArchitectureAdapter, ChatAdapter, ChatRole, LineKind, ProductivityAdapter, ProjectsAdapter,
    TerminalAdapter,
};
use ferve_client::ai::MockGenerator;
use ferve_client::config::{
    resolve_daemon_url, resolve_log_dir, resolve_log_level, resolve_log_stdout,
};
use ferve_client::logging::{init_logging, LogSettings};
use ferve_client::store::SliceReader;
use ferve_client::{AdapterTimings, ClientConfig, ConnectionHandle, ConnectionManager, StateStore};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "ferve-dash")]
#[command(about = "Headless Ferve dashboard client", long_about = None)]
struct Args {
    #[arg(long, default_value = "")]
    url: String,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value_t = 5)]
    reconnect_secs: u64,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror system stats and the activity log until Ctrl-C
    Watch,
    /// Run a shell command on the daemon host
    Exec {
        #[arg(required = true, trailing_var_arg = true)]
        cmd: Vec<String>,
    },
    /// Ask the daemon's assistant
    Chat {
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// List tasks
    Tasks,
    /// List projects with their git status
    Projects,
    /// Generate architecture notes (offline)
    Docs { prompt: Option<String> },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&LogSettings {
        level: resolve_log_level(args.debug),
        log_dir: resolve_log_dir(&args.log_dir),
        stdout: resolve_log_stdout(),
        file_prefix: "ferve-dash".to_string(),
    });

    let command = args.command.unwrap_or(Command::Watch);
    if let Command::Docs { prompt } = &command {
        return docs(prompt.as_deref()).await;
    }

    let url = resolve_daemon_url(&args.url).context("resolving daemon url")?;
    let config = ClientConfig::new(url)
        .with_reconnect_delay(Duration::from_secs(args.reconnect_secs.max(1)));
    let store = StateStore::new(config.event_log_capacity);
    info!(event = "ferve_dash_start", url = %config.daemon_url);
    let connection = ConnectionManager::spawn(config, store.clone());
    let timings = AdapterTimings::default();

    let result = match command {
        Command::Watch => watch(&store).await,
        Command::Exec { cmd } => exec(&connection, &store, &timings, &cmd.join(" ")).await,
        Command::Chat { message } => chat(&connection, &store, &timings, &message.join(" ")).await,
        Command::Tasks => tasks(&connection, &store, &timings).await,
        Command::Projects => projects(&connection, &store, &timings).await,
        Command::Docs { .. } => Ok(()),
    };
    connection.shutdown().await;
    result
}

async fn watch(store: &StateStore) -> Result<()> {
    let mut connection = store.connection().subscribe();
    let mut stats = store.system_stats().subscribe();
    let mut log = store.event_log().subscribe();
    let mut mark = log.borrow_and_update().pushed();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("[{}] connection {}", Local::now().format("%H:%M:%S"), *connection.borrow_and_update());
            }
            changed = stats.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = stats.borrow_and_update().clone();
                println!(
                    "[{}] cpu {:.1}% | mem {:.1}/{:.1} GB ({:.0}%) | disk {:.0}%",
                    Local::now().format("%H:%M:%S"),
                    current.cpu,
                    current.memory_used_gb(),
                    current.memory_total_gb(),
                    current.memory.percent,
                    current.disk.percent
                );
            }
            changed = log.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = log.borrow_and_update().clone();
                for entry in current.since(mark) {
                    println!("[{}] {:<8} {}", entry.timestamp, entry.source, entry.message);
                }
                mark = current.pushed();
            }
        }
    }
    Ok(())
}

async fn exec(
    connection: &ConnectionHandle,
    store: &StateStore,
    timings: &AdapterTimings,
    command: &str,
) -> Result<()> {
    require_open(connection).await?;
    let terminal = TerminalAdapter::attach(connection.clone(), store, timings);
    if !terminal.execute(command) {
        bail!("command ignored: {command:?}");
    }
    // banner and the echoed command come first
    if !wait_for(&terminal.history(), REPLY_TIMEOUT, |lines| lines.len() > 2).await {
        warn!(event = "terminal_reply_timeout", command);
        bail!("no output from daemon within {}s", REPLY_TIMEOUT.as_secs());
    }
    for line in terminal.history().get().into_iter().skip(2) {
        match line.kind {
            LineKind::Error => eprintln!("{}", line.content),
            _ => println!("{}", line.content),
        }
    }
    Ok(())
}

async fn chat(
    connection: &ConnectionHandle,
    store: &StateStore,
    timings: &AdapterTimings,
    message: &str,
) -> Result<()> {
    require_open(connection).await?;
    let chat = ChatAdapter::attach(connection.clone(), store, timings);
    if !chat.send_message(message) {
        bail!("message ignored");
    }
    if !wait_for(&chat.processing(), REPLY_TIMEOUT, |busy| !busy).await {
        bail!("no reply within {}s", REPLY_TIMEOUT.as_secs());
    }
    if let Some(reply) = chat
        .history()
        .get()
        .into_iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
    {
        println!("{}", reply.content);
    }
    Ok(())
}

async fn tasks(
    connection: &ConnectionHandle,
    store: &StateStore,
    timings: &AdapterTimings,
) -> Result<()> {
    require_open(connection).await?;
    let productivity = ProductivityAdapter::attach(connection.clone(), store, timings);
    let mut list = productivity.tasks().subscribe();
    if tokio::time::timeout(LIST_TIMEOUT, list.changed()).await.is_err() {
        println!("No tasks received.");
        return Ok(());
    }
    let tasks = productivity.tasks().get();
    println!("Found {} tasks:", tasks.len());
    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        println!("  [{mark}] {:>3} {}", task.id, task.text);
    }
    Ok(())
}

async fn projects(
    connection: &ConnectionHandle,
    store: &StateStore,
    timings: &AdapterTimings,
) -> Result<()> {
    require_open(connection).await?;
    let projects = ProjectsAdapter::attach(connection.clone(), store, timings);
    if !wait_for(&projects.projects(), LIST_TIMEOUT, |list| !list.is_empty()).await {
        println!("No projects received.");
        return Ok(());
    }
    // git_status replies trail the list
    tokio::time::sleep(timings.git_status_delay * 2).await;
    for entry in projects.projects().get() {
        let git = match &entry.git_status {
            Some(status) if status.error.is_none() => format!(
                "{}{}",
                status.branch,
                if status.has_changes { " *" } else { "" }
            ),
            Some(_) | None => "-".to_string(),
        };
        println!("{:<20} {:<12} {:<16} {}", entry.id, entry.project.kind, git, entry.project.path);
    }
    Ok(())
}

async fn docs(prompt: Option<&str>) -> Result<()> {
    let adapter = ArchitectureAdapter::new(MockGenerator::default());
    let prompt = match prompt {
        Some(prompt) => prompt,
        None => PROMPT_PRESETS
            .first()
            .map(|preset| preset.prompt)
            .context("no prompt presets")?,
    };
    println!("{}", adapter.generate_docs(prompt).await);
    Ok(())
}

async fn require_open(connection: &ConnectionHandle) -> Result<()> {
    if connection.wait_until_open(CONNECT_TIMEOUT).await {
        return Ok(());
    }
    bail!(
        "daemon not reachable within {}s (state: {})",
        CONNECT_TIMEOUT.as_secs(),
        connection.state()
    )
}

async fn wait_for<T, F>(reader: &SliceReader<T>, timeout: Duration, mut ready: F) -> bool
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(&T) -> bool,
{
    let mut rx = reader.subscribe();
    let reached = matches!(
        tokio::time::timeout(timeout, rx.wait_for(|value| ready(value))).await,
        Ok(Ok(_))
    );
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferve_client::store::Slice;

    #[tokio::test(start_paused = true)]
    async fn wait_for_reports_condition_or_timeout() {
        let slice = Slice::new(0u32);
        assert!(!wait_for(&slice.reader(), Duration::from_millis(50), |n| *n > 0).await);

        let writer = slice.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.replace(3);
        });
        assert!(wait_for(&slice.reader(), Duration::from_secs(1), |n| *n == 3).await);
    }
}
