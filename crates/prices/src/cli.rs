use {
    alloy::primitives::{Address, U256},
    std::path::PathBuf,
    tracing::level_filters::LevelFilter,
};

#[derive(Debug, clap::Parser)]
#[clap(name = "prices")]
pub struct Args {
    /// Path to the configuration file. This file should be in TOML format.
    #[clap(long, env)]
    pub config: PathBuf,

    #[clap(
        long,
        env,
        default_value = "warn,prices=debug,price_estimation=debug,ethrpc=debug"
    )]
    pub log_filter: String,

    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Keep prices up to date and periodically report gauge APRs.
    Run,
    /// Print the best quote for a swap and exit.
    Quote(Quote),
}

#[derive(Debug, clap::Args)]
pub struct Quote {
    #[clap(long)]
    pub token_in: Address,

    #[clap(long)]
    pub token_out: Address,

    /// Amount of `token-in` in its smallest unit.
    #[clap(long)]
    pub amount_in: U256,

    /// Only quote the fee tier with this tick spacing.
    #[clap(long, conflicts_with = "via")]
    pub tick_spacing: Option<i32>,

    /// Route through this intermediate token.
    #[clap(long)]
    pub via: Option<Address>,
}
