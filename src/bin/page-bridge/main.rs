mod hands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use page_bridge::api::DEFAULT_TIMEOUT;
use page_bridge::dom::{ChromePage, ChromePrompter};
use page_bridge::navigation::default_markers;
use page_bridge::{
    Agent, AgentEvent, AgentSettings, ConfigPatch, ConfigStore, FileConfigStore, HttpBridgeApi,
};

#[derive(Parser)]
#[command(name = "page-bridge", version, about = "Call and text candidates from the page you are on")]
struct Cli {
    /// Config file shared with `config set`
    #[arg(long, global = true, env = "PAGE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to Chrome and run the agent until Ctrl-C
    Run(RunArgs),
    /// Read or change the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// DevTools HTTP endpoint of a Chrome started with --remote-debugging-port
    #[arg(long, default_value = "http://127.0.0.1:9222", env = "PAGE_BRIDGE_CHROME")]
    chrome: String,

    /// Launch a dedicated Chrome instead of attaching
    #[arg(long)]
    launch: bool,

    /// Navigate the chosen tab here first
    #[arg(long)]
    open: Option<String>,

    /// Per-request timeout for the bridge service
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// URL substring marking candidate pages (repeatable)
    #[arg(long = "marker")]
    markers: Vec<String>,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        backend_url: Option<String>,
        /// Pass an empty value to clear the stored id
        #[arg(long)]
        recruiter_id: Option<String>,
        #[arg(long)]
        recruiter_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("page_bridge=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => FileConfigStore::default_path()?,
    };
    let store = FileConfigStore::new(path);

    match cli.command {
        Command::Run(args) => run(args, &store).await,
        Command::Config { action } => configure(action, &store),
    }
}

async fn run(args: RunArgs, store: &FileConfigStore) -> Result<()> {
    let config = store
        .get()
        .with_context(|| format!("reading {}", store.path().display()))?;
    let api = HttpBridgeApi::new(&config.backend_api_url, Duration::from_secs(args.timeout_secs))?;
    info!(backend = api.base_url(), "bridge service");

    let markers = if args.markers.is_empty() {
        default_markers()
    } else {
        args.markers
    };

    let session =
        hands::BrowserSession::open(&args.chrome, args.launch, args.open.as_deref(), &markers)
            .await?;

    let (tx, rx) = mpsc::unbounded_channel::<AgentEvent>();
    let page = ChromePage::new(session.tab.clone());
    page.connect(tx.clone())?;

    let agent = Agent::new(
        page,
        ChromePrompter::new(session.tab.clone()),
        Arc::new(api),
        AgentSettings {
            page_markers: markers,
            stored_operator: config.recruiter_info,
        },
        tx.clone(),
        Handle::current(),
    );

    info!("agent ready, press Ctrl-C to stop");
    let mut worker = tokio::task::spawn_blocking(move || agent.run(rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            let _ = tx.send(AgentEvent::Shutdown);
            (&mut worker).await.map_err(|e| anyhow!("agent loop panicked: {}", e))?;
        }
        result = &mut worker => {
            result.map_err(|e| anyhow!("agent loop panicked: {}", e))?;
        }
    }

    drop(session);
    Ok(())
}

fn configure(action: ConfigAction, store: &FileConfigStore) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = store.get()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Set {
            backend_url,
            recruiter_id,
            recruiter_name,
        } => {
            store.set(ConfigPatch {
                backend_api_url: backend_url,
                recruiter_id: recruiter_id.map(Some),
                recruiter_name,
            })?;
            println!("Configuration saved to {}", store.path().display());
        }
    }
    Ok(())
}
