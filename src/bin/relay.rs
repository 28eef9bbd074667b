use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use easygrow_relay::{
    actors::consumer::ConsumerHandle,
    alerts::AlertFanout,
    amqp::AmqpBroker,
    config::{Config, read_config_file},
    hub::BroadcastHub,
    pipeline::Pipeline,
    storage::open_gateway,
    util::log_targets,
};
use futures::future::select_all;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log everything down to TRACE
    #[arg(long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = log_targets(level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let gateway = open_gateway(&config.storage)
        .await
        .context("could not open storage")?;
    let hub = BroadcastHub::new(config.hub.viewer_buffer);
    let fanout = Arc::new(
        AlertFanout::from_config(&config.alerts, &config.contacts)
            .context("could not set up notification providers")?,
    );
    for (channel, providers) in fanout.provider_chains() {
        info!("alert channel {channel}: {}", providers.join(" -> "));
    }

    let pipeline = Arc::new(Pipeline::new(
        hub.clone(),
        gateway.clone(),
        config.classifier(),
        fanout,
        config.alerts.actuator_notifications,
    ));

    #[cfg(feature = "api")]
    {
        use easygrow_relay::api::{ApiConfig, ApiState, spawn_api_server};

        let state = ApiState::new(hub.clone(), gateway.clone(), config.queues());
        spawn_api_server(ApiConfig::from(&config.http), state).await?;
    }

    let broker = AmqpBroker::connect(&config.amqp.url).await?;
    let mut consumers = Vec::new();
    for queue in config.queues() {
        let source = broker.consume(&queue, &config.amqp.consumer_tag).await?;
        consumers.push(ConsumerHandle::spawn(source, pipeline.clone()));
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("could not listen for ctrl-c")?;
            info!("received ctrl-c, shutting down");
        }
        _ = select_all(consumers.iter().map(|consumer| Box::pin(consumer.stopped()))) => {
            warn!("a queue consumer stopped, shutting down");
        }
    }

    for consumer in &consumers {
        consumer.shutdown().await;
    }
    for consumer in consumers {
        let stats = consumer.wait().await?;
        info!("final stats: {stats:?}");
    }

    if let Err(e) = broker.close().await {
        warn!("{e:#}");
    }

    Ok(())
}
