use alloy::primitives::Address;
use betlink::{
    contract::{
        BETTING_CONTRACT_ADDRESS,
        ContractConfig,
        DESTINATION_CHAIN_ID,
        DESTINATION_RPC_URL,
    },
    fetch::DEFAULT_REFRESH_INTERVAL,
    prefs::default_state_dir,
    session::DEFAULT_RECONCILE_INTERVAL,
    wallets::resolve_wallet_dir,
};
use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;

#[derive(Parser, Debug)]
#[command(version, about = "Terminal client for peer-to-peer bets", long_about = None)]
struct Args {
    /// RPC endpoint of the chain the betting contract lives on
    #[arg(long, env = "BETLINK_RPC_URL", default_value = DESTINATION_RPC_URL)]
    rpc_url: String,

    #[arg(long, env = "BETLINK_CONTRACT", default_value_t = BETTING_CONTRACT_ADDRESS)]
    contract: Address,

    /// Destination chain id passed to create/join/resolve
    #[arg(long, env = "BETLINK_CHAIN_ID", default_value_t = DESTINATION_CHAIN_ID)]
    chain_id: u64,

    /// Directory holding encrypted JSON keystores (default ~/.betlink/keystores)
    #[arg(long, env = "BETLINK_WALLET_DIR")]
    wallet_dir: Option<String>,

    /// Keystore to preselect; the first one is used otherwise
    #[arg(long, env = "BETLINK_WALLET")]
    wallet: Option<String>,

    #[arg(
        long,
        default_value_t = DEFAULT_RECONCILE_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    reconcile_secs: u64,

    #[arg(
        long,
        default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    refresh_secs: u64,

    #[arg(long, env = "BETLINK_STATE_DIR")]
    state_dir: Option<String>,

    #[arg(long, env = "BETLINK_LOG_DIR")]
    log_dir: Option<String>,
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "betlink.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!(err))?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let state_dir = match args.state_dir.as_deref() {
        Some(raw) => expand(raw),
        None => default_state_dir()?,
    };
    let log_dir = args
        .log_dir
        .as_deref()
        .map(expand)
        .unwrap_or_else(|| state_dir.join("logs"));
    let _guard = init_tracing(&log_dir)?;
    tracing::info!(rpc = %args.rpc_url, contract = %args.contract, "starting betlink");

    let config = client::AppConfig {
        contract: ContractConfig {
            rpc_url: args.rpc_url,
            address: args.contract,
            chain_id: args.chain_id,
        },
        wallet_dir: resolve_wallet_dir(args.wallet_dir.as_deref())?,
        wallet: args.wallet,
        reconcile_interval: Duration::from_secs(args.reconcile_secs),
        refresh_interval: Duration::from_secs(args.refresh_secs),
        state_dir,
    };
    client::run_app(config).await
}
