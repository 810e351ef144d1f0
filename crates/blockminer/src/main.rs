use std::path::PathBuf;
use std::process::ExitCode;

use blockminer::{Config, MinerError, MiningLoop, RpcClient};
use clap::Parser;
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser, Debug)]
#[command(name = "blockminer", version, about = "Solo block miner for a full node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "blockminer.toml")]
    config: PathBuf,

    /// Worker threads for the nonce search
    #[arg(short, long)]
    threads: Option<usize>,

    /// Nonces to try per template
    #[arg(short, long)]
    nonces: Option<u64>,

    /// Message written into the coinbase
    #[arg(short, long)]
    message: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), MinerError> {
    let mut config = Config::read(&args.config)?;
    if let Some(threads) = args.threads {
        config.miner.threads = threads;
    }
    if let Some(nonces) = args.nonces {
        config.miner.nonces_per_template = nonces;
    }
    if let Some(message) = args.message {
        config.miner.message = message;
    }
    config.validate()?;

    info!("Loaded config from {}", args.config.display());
    let client = RpcClient::connect(&config.node).map_err(MinerError::Connect)?;
    let mut miner = MiningLoop::new(client, config.miner, StdRng::from_entropy())?;
    miner.run(None)
}
