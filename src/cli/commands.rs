use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "relay-ledger", about = "A single-writer ledger node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        name = "simulate",
        about = "Run a producer and a line of remote nodes in one process"
    )]
    Simulate {
        #[arg(long = "config", help = "TOML file with the producer's settings")]
        config: Option<PathBuf>,
        #[arg(long = "remotes", default_value_t = 3, help = "Number of remote nodes")]
        remotes: usize,
        #[arg(long = "block-time-ms", help = "Override the block time in milliseconds")]
        block_time_ms: Option<u64>,
        #[arg(
            long = "tx-interval-ms",
            default_value_t = 1000,
            help = "How often the first remote sends a transaction"
        )]
        tx_interval_ms: u64,
    },
    #[command(name = "genesis", about = "Print the genesis block hash")]
    Genesis,
    #[command(name = "keygen", about = "Generate a validator key and print its address")]
    Keygen,
}
