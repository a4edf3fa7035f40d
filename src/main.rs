use std::{path::PathBuf, sync::atomic::Ordering, sync::Arc};

use clap::Parser;
use log::info;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use presence_publish::{
    scenario::{
        load_scenario, load_settings, replay, spawn_responder, ResponsePlan, SimulatedTransport,
    },
    state_machine::NoopStateChangeHandler,
    PublishEngine, PublisherConfig, PublisherHandle, StaticSettings,
};

/// Replay a trigger scenario against a simulated presence server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON publisher config; falls back to PRESENCE_PUBLISH_CONFIG, then defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON device settings; all features enabled when omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// JSON list of `{ "delay_ms": .., "trigger": {..} }` steps
    #[arg(short, long)]
    scenario: PathBuf,

    /// Code the simulated server answers every PUBLISH with
    #[arg(long, default_value_t = 200)]
    response_code: i32,

    #[arg(long, default_value = "OK")]
    response_reason: String,

    /// Delay between a submission and its response
    #[arg(long, default_value_t = 100)]
    latency_ms: u64,

    /// How long to keep running after the last step
    #[arg(long, default_value_t = 5000)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PublisherConfig::from_file(path)?,
        None => PublisherConfig::from_env()?,
    };
    let settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => StaticSettings::default(),
    };
    let steps = load_scenario(&args.scenario)?;

    let (transport, inbound) = SimulatedTransport::new();
    let submitted = transport.counter();
    let engine = PublishEngine::new(
        config,
        Arc::new(settings),
        Arc::new(transport),
        Arc::new(NoopStateChangeHandler),
    )?;
    let handle = PublisherHandle::spawn(engine);

    let cancel = CancellationToken::new();
    let responder = spawn_responder(
        handle.clone(),
        inbound,
        ResponsePlan {
            code: args.response_code,
            reason: args.response_reason.clone(),
            latency: Duration::from_millis(args.latency_ms),
        },
        cancel.clone(),
    );

    info!("Replaying {} steps", steps.len());
    replay(&handle, &steps).await?;
    sleep(Duration::from_millis(args.settle_ms)).await;

    let snapshot = handle.snapshot().await?;
    cancel.cancel();
    responder.await?;

    println!("submissions: {}", submitted.load(Ordering::SeqCst));
    println!("state: {}", snapshot.state);
    println!("blocked: {}", snapshot.blocked);
    println!("cached trigger: {}", snapshot.has_cached_trigger);
    if let Some(last) = &snapshot.last_published {
        println!("last published: {last}");
    }
    if let Some(retry) = snapshot.retry {
        let left = retry
            .fire_at
            .saturating_duration_since(tokio::time::Instant::now());
        println!("retry pending in {left:?}");
    }
    Ok(())
}
