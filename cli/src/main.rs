use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use http_primitives::config::{DEFAULT_HOST, DEFAULT_RECONNECT_DELAY_MS};
use http_primitives::py_youwol::types::{DEFAULT_AUTH_ID, DEFAULT_ENV_ID, LoginBody};
use http_primitives::py_youwol::{PyYouwolClient, reset_dbs};
use http_primitives::{
    CallerOptions, ClientConfig, ClientError, CommandType, FormData, LiveOptions, MessageFilter, RequestEvent,
    RequestMonitoring,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// How long to wait for the progress printer to drain after a transfer.
const PROGRESS_FLUSH: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("cannot access {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("no file name in {}", .0.display())]
    InvalidFileName(PathBuf),
}

#[derive(Parser, Debug)]
#[command(name = "yw-cli", about = "py-youwol local backend CLI")]
struct Cli {
    #[arg(long, env = "PY_YOUWOL_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, env = "PY_YOUWOL_LOCAL_ONLY", default_value_t = true, action = ArgAction::Set)]
    local_only: bool,

    #[arg(long, env = "PY_YOUWOL_AUTO_RECONNECT", default_value_t = false, action = ArgAction::Set)]
    auto_reconnect: bool,

    #[arg(long, env = "PY_YOUWOL_RECONNECT_DELAY_MS", default_value_t = DEFAULT_RECONNECT_DELAY_MS)]
    reconnect_delay_ms: u64,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let live = LiveOptions {
            auto_reconnect: self.auto_reconnect,
            auto_reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        };
        ClientConfig::new(self.host.as_str()).with_local_only(self.local_only).with_live_options(live)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    Healthz,
    Login {
        #[arg(long, default_value = DEFAULT_AUTH_ID)]
        auth_id: String,
        #[arg(long, default_value = DEFAULT_ENV_ID)]
        env_id: String,
    },
    Status,
    AccessToken,
    /// Run a backend custom command.
    Command(CustomCommandArgs),
    /// Wipe the backend databases.
    Reset,
    /// Print live channel messages as JSON lines.
    Watch(WatchArgs),
    Download {
        /// Path under the host, e.g. `/api/assets-gateway/raw/...`.
        path: String,
        #[arg(long)]
        out: PathBuf,
    },
    Upload {
        path: String,
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CustomCommandArgs {
    name: String,
    #[arg(long, value_enum, default_value_t = CommandMethod::Get)]
    method: CommandMethod,
    /// JSON body for `post` and `put`.
    #[arg(long)]
    data: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CommandMethod {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(value_enum)]
    channel: WatchChannel,
    #[arg(long = "label")]
    labels: Vec<String>,
    #[arg(long = "attr", value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,
    /// Stop after this many messages.
    #[arg(long)]
    count: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum WatchChannel {
    Logs,
    Data,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = PyYouwolClient::new(cli.config())?;

    match cli.command {
        Command::Healthz => print_json(&client.get_healthz(CallerOptions::default()).await?.raise()?),
        Command::Login { auth_id, env_id } => {
            let body = LoginBody::new(auth_id, env_id);
            print_json(&client.admin.environment.login(&body, CallerOptions::default()).await?.raise()?)
        }
        Command::Status => print_json(&client.admin.environment.get_status(CallerOptions::default()).await?.raise()?),
        Command::AccessToken => {
            print_json(&client.authorization.get_access_token(CallerOptions::default()).await?.raise()?)
        }
        Command::Command(args) => run_custom_command(&client, args).await,
        Command::Reset => print_json(&reset_dbs(&client).await?.raise()?),
        Command::Watch(args) => run_watch(&client, args).await,
        Command::Download { path, out } => run_download(&client, &path, &out).await,
        Command::Upload { path, file } => run_upload(&client, &path, &file).await,
    }
}

async fn run_custom_command(client: &PyYouwolClient, args: CustomCommandArgs) -> Result<(), CliError> {
    let commands = &client.admin.custom_commands;
    let body = match &args.data {
        Some(data) => serde_json::from_str::<Value>(data)?,
        None => Value::Object(serde_json::Map::new()),
    };
    let caller = CallerOptions::default();
    let outcome = match args.method {
        CommandMethod::Get => commands.do_get(&args.name, caller).await?,
        CommandMethod::Post => commands.do_post(&args.name, body, caller).await?,
        CommandMethod::Put => commands.do_put(&args.name, body, caller).await?,
        CommandMethod::Delete => commands.do_delete(&args.name, caller).await?,
    };
    print_json(&outcome.raise()?)
}

async fn run_watch(client: &PyYouwolClient, args: WatchArgs) -> Result<(), CliError> {
    client.start_ws().await?;
    let channel = match args.channel {
        WatchChannel::Logs => client.ws().logs(),
        WatchChannel::Data => client.ws().data(),
    };

    let mut filter = MessageFilter::new();
    for label in args.labels {
        filter = filter.with_label(label);
    }
    for (key, value) in args.attributes {
        filter = filter.with_attribute(key, value);
    }
    let mut messages = filter.apply::<Value>(channel.subscribe());
    tracing::info!(url = %channel.url(), "watching live channel");

    let mut seen = 0_usize;
    while let Some(message) = messages.recv().await {
        println!("{}", serde_json::to_string(&message)?);
        seen += 1;
        if args.count.is_some_and(|count| seen >= count) {
            break;
        }
    }
    Ok(())
}

async fn run_download(client: &PyYouwolClient, path: &str, out: &Path) -> Result<(), CliError> {
    let (monitoring, printer) = progress_printer();
    let transfer = client.router().download_blob(path, path, CallerOptions::monitored(monitoring), None)?;
    let outcome = transfer.settled().await;
    flush(printer).await;

    let bytes = outcome?.raise()?;
    tokio::fs::write(out, &bytes).await.map_err(|source| CliError::Io { path: out.to_path_buf(), source })?;
    eprintln!("wrote {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

async fn run_upload(client: &PyYouwolClient, path: &str, file: &Path) -> Result<(), CliError> {
    let data = tokio::fs::read(file).await.map_err(|source| CliError::Io { path: file.to_path_buf(), source })?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CliError::InvalidFileName(file.to_path_buf()))?;

    let (monitoring, printer) = progress_printer();
    let form = FormData::new().file("file", file_name, None, data);
    let transfer =
        client.router().send_form_data(CommandType::Upload, path, form, None, CallerOptions::monitored(monitoring))?;
    let outcome = transfer.settled().await;
    flush(printer).await;

    print_json(&outcome?.raise()?)
}

fn progress_printer() -> (RequestMonitoring, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<RequestEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("{}", render_progress(&event));
        }
    });
    (RequestMonitoring::new(tx), printer)
}

async fn flush(printer: JoinHandle<()>) {
    if tokio::time::timeout(PROGRESS_FLUSH, printer).await.is_err() {
        tracing::debug!("progress printer still running; detached");
    }
}

fn render_progress(event: &RequestEvent) -> String {
    let step = format!("{:?}", event.step).to_lowercase();
    match event.total_count {
        Some(total) => format!("[{}] {step} {}/{total}", event.request_id, event.transferred_count),
        None => format!("[{}] {step} {}", event.request_id, event.transferred_count),
    }
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
