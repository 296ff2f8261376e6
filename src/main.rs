// Entry point of the node binary
// The simulate command wires a producer and a line of remote nodes together in
// one process over in-memory transports, the rest are small inspection helpers
use clap::Parser;
use log::{error, info, LevelFilter};
use rand::Rng;
use relay_ledger::{
    Block, BlockHasher, Command, LocalTransport, Message, NetAddr, NodeConfig, Opt, PrivateKey,
    Server, ServerOpts, Transaction, Transport,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() {
    // Info by default, RUST_LOG still wins when set
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command).await {
        error!("Error: {e}");
        process::exit(1);
    }
}

async fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Simulate {
            config,
            remotes,
            block_time_ms,
            tx_interval_ms,
        } => simulate(config, remotes, block_time_ms, tx_interval_ms).await?,
        Command::Genesis => {
            println!("{}", Block::genesis().hash(&BlockHasher));
        }
        Command::Keygen => {
            let key = PrivateKey::generate()?;
            println!("Public key: {}", key.public_key());
            println!("Address: {}", key.public_key().address());
        }
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>, block_time_ms: Option<u64>) -> relay_ledger::Result<NodeConfig> {
    let mut config = match path {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    config.apply_env()?;
    if let Some(ms) = block_time_ms {
        config.block_time_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

async fn simulate(
    path: Option<PathBuf>,
    remotes: usize,
    block_time_ms: Option<u64>,
    tx_interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(path, block_time_ms)?;
    // The simulation always has exactly one producer
    config.validator = true;

    let local: Arc<dyn Transport> = Arc::new(LocalTransport::with_capacity(
        config.id.as_str(),
        config.inbound_capacity,
    ));
    let remote_transports: Vec<Arc<dyn Transport>> = (0..remotes)
        .map(|i| {
            Arc::new(LocalTransport::with_capacity(
                format!("REMOTE_{i}"),
                config.inbound_capacity,
            )) as Arc<dyn Transport>
        })
        .collect();

    // LOCAL <-> REMOTE_0 <-> REMOTE_1 <-> ...
    let mut previous = Arc::clone(&local);
    for transport in &remote_transports {
        LocalTransport::link(&previous, transport)?;
        previous = Arc::clone(transport);
    }

    let mut servers = vec![Server::new(ServerOpts::from_config(&config, Arc::clone(&local))?)?];
    for transport in &remote_transports {
        let remote_config = NodeConfig {
            id: transport.addr().to_string(),
            validator: false,
            ..config.clone()
        };
        servers.push(Server::new(ServerOpts::from_config(
            &remote_config,
            Arc::clone(transport),
        )?)?);
    }

    let handles: Vec<_> = servers.iter().map(|s| s.handle()).collect();
    let tasks: Vec<JoinHandle<relay_ledger::Result<()>>> =
        servers.into_iter().map(|s| tokio::spawn(s.start())).collect();

    let mut helpers = Vec::new();
    if let Some(sender) = remote_transports.first() {
        helpers.push(spawn_tx_sender(
            Arc::clone(sender),
            local.addr(),
            Duration::from_millis(tx_interval_ms.max(1)),
        ));
    }
    if remote_transports.len() >= 2 {
        let from = Arc::clone(&remote_transports[0]);
        let to = remote_transports[1].addr();
        let delay = config.block_time();
        helpers.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let sent = match Message::get_status().and_then(|m| m.bytes()) {
                Ok(bytes) => from.send_message(&to, bytes).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                error!("Failed to request status from {to}: {e}");
            }
        }));
    }

    info!("Simulation running with {remotes} remote node(s), press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    for helper in helpers {
        helper.abort();
    }
    for handle in &handles {
        handle.shutdown();
    }
    for task in tasks {
        if let Err(e) = task.await? {
            error!("Server stopped with error: {e}");
        }
    }
    for handle in &handles {
        info!(
            "{} finished at height {} with {} pooled transaction(s)",
            handle.get_id(),
            handle.chain().height(),
            handle.mempool().len()
        );
    }
    Ok(())
}

// Sends a freshly signed random transaction to the producer on every tick
fn spawn_tx_sender(from: Arc<dyn Transport>, to: NetAddr, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = send_random_tx(from.as_ref(), &to).await {
                error!("Failed to send transaction to {to}: {e}");
            }
        }
    })
}

async fn send_random_tx(from: &dyn Transport, to: &NetAddr) -> relay_ledger::Result<()> {
    let key = PrivateKey::generate()?;
    let payload: [u8; 32] = rand::thread_rng().gen();
    let mut tx = Transaction::new(payload.to_vec());
    tx.sign(&key)?;
    from.send_message(to, Message::from_transaction(&tx)?.bytes()?)
        .await
}
