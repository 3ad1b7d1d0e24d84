pub mod cli;
pub mod config;
pub mod core;
pub mod gauges;
pub mod resolver;
pub mod subgraph;

use {
    crate::{
        cli::{Args, Command},
        config::Config,
        gauges::{GaugeAprReporter, TvlSource},
        resolver::PriceResolver,
        subgraph::SubgraphClient,
    },
    anyhow::{Context, Result, anyhow},
    clap::Parser,
    ethrpc::EthCall,
    price_estimation::QuoteRouter,
    std::{sync::Arc, time::Duration},
    tokio::task::JoinHandle,
};

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Args::parse_from(args);
    observe::tracing::initialize(&args.log_filter, args.log_stderr_threshold);
    observe::metrics::setup_registry(Some("prices".into()), None);
    tracing::info!(?args, "running prices");

    if let Err(err) = run(args).await {
        tracing::error!(?err, "prices failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = config::load(&args.config).await?;
    let eth: Arc<dyn EthCall> = Arc::new(ethrpc::client(&config.rpc)?);
    match args.command {
        Command::Run => serve(config, eth).await,
        Command::Quote(quote) => print_quote(config, eth, quote).await,
    }
}

async fn serve(config: Config, eth: Arc<dyn EthCall>) -> Result<()> {
    let interval = config.prices.refresh_interval;
    let resolver = Arc::new(PriceResolver::new(eth.clone(), config.prices));
    let refresh_task = resolver.spawn_refresh_task(interval);

    let tvls = match config.subgraph {
        Some(subgraph) => {
            let client = reqwest::Client::builder()
                .timeout(config.rpc.timeout)
                .build()
                .context("failed to build subgraph http client")?;
            Some(Arc::new(SubgraphClient::new(client, subgraph.url)) as Arc<dyn TvlSource>)
        }
        None => None,
    };
    let reporter = GaugeAprReporter::new(eth, config.gauges, tvls);
    let report_task = spawn_apr_reports(reporter, resolver, interval);

    let metrics_task = config.metrics_address.map(observe::metrics::serve_metrics);
    let metrics = async {
        match metrics_task {
            Some(task) => task.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = refresh_task => Err(anyhow!("price refresh task exited: {result:?}")),
        result = report_task => Err(anyhow!("APR report task exited: {result:?}")),
        result = metrics => Err(anyhow!("metrics task exited: {result:?}")),
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}

fn spawn_apr_reports(
    reporter: GaugeAprReporter,
    resolver: Arc<PriceResolver>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Prices are first refreshed at start, reports begin one interval later.
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            ticker.tick().await;
            let price = resolver.prices().protocol_token.clone();
            if price.stale || price.updated_at.is_none() {
                tracing::warn!(?price, "reporting APRs with an outdated protocol token price");
            }
            for apr in reporter.refresh(price.usd).await {
                tracing::info!(
                    gauge = %apr.name,
                    pool = %apr.pool,
                    reward_rate = %apr.reward_rate,
                    tvl_usd = apr.tvl_usd,
                    apr = apr.apr,
                    "gauge APR"
                );
            }
        }
    })
}

async fn print_quote(config: Config, eth: Arc<dyn EthCall>, quote: cli::Quote) -> Result<()> {
    let router = QuoteRouter::new(
        eth,
        config.quoter.address,
        config.quoter.factory,
        config.quoter.tick_spacings,
    );
    match quote.via {
        Some(via) => {
            let result = router
                .multi_hop_quote(quote.token_in, via, quote.token_out, quote.amount_in)
                .await?;
            println!(
                "amount out: {}\ngas estimate: {}\ntick spacings: {:?}",
                result.amount_out, result.gas_estimate, result.tick_spacings
            );
        }
        None => match router
            .best_quote(
                quote.token_in,
                quote.token_out,
                quote.amount_in,
                quote.tick_spacing,
            )
            .await
        {
            Some(result) => println!(
                "amount out: {}\ngas estimate: {}\ntick spacing: {}\nticks crossed: {}",
                result.amount_out,
                result.gas_estimate,
                result.tick_spacing,
                result.initialized_ticks_crossed
            ),
            None => println!("no route available"),
        },
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    // Intercept signals for graceful shutdown. Kubernetes sends sigterm, Ctrl-C
    // sends sigint.
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .unwrap()
            .recv()
            .await
    };
    let sigint = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .unwrap()
            .recv()
            .await;
    };
    futures::pin_mut!(sigint);
    futures::pin_mut!(sigterm);
    futures::future::select(sigterm, sigint).await;
}

#[cfg(windows)]
async fn shutdown_signal() {
    // No support for signal handling on Windows.
    std::future::pending().await
}
