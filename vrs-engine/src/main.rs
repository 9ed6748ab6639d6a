//! Scripted session replay (vrs-demo)
//!
//! Runs a real recognition session against simulated collaborators, driven
//! by a TOML scenario, and prints every session event as one JSON line on
//! stdout. Logs go to stderr. Exits non-zero if the session hits a fatal
//! error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vrs_common::ScanEvent;
use vrs_engine::backend::ScanServices;
use vrs_engine::config::SessionConfig;
use vrs_engine::frame::FramePool;
use vrs_engine::session::Session;
use vrs_engine::sim::{label_frame, Scenario, ScenarioStep, SimClock, SimFrameSource};

/// Frame buffers kept for reuse
const POOL_RETAINED: usize = 4;

/// Grace period for in-flight work after the last step
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Command-line arguments for vrs-demo
#[derive(Parser, Debug)]
#[command(name = "vrs-demo")]
#[command(about = "Replay a scripted visual-recognition session")]
#[command(version)]
struct Args {
    /// Scenario file to replay
    #[arg(env = "VRS_SCENARIO")]
    scenario: PathBuf,

    /// Session configuration file (defaults to VRS_CONFIG, then the user
    /// config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print events instead of one JSON object per line
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = SessionConfig::resolve(args.config.as_deref())
        .context("Failed to load session configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    info!(
        scenario = %args.scenario.display(),
        steps = scenario.steps.len(),
        "Starting scripted session"
    );

    let pool = FramePool::new(POOL_RETAINED);
    let clock = Arc::new(SimClock::new());
    let (frames, mut frame_requests) = SimFrameSource::new();
    let store = Arc::new(scenario.store());
    let services = ScanServices::new(
        Arc::new(scenario.backend()),
        store.clone(),
        Arc::new(frames),
    );

    let session = Session::with_event_capacity(services, clock.clone(), config.event_capacity);
    let printer = spawn_printer(session.subscribe(), args.pretty);

    session
        .configure(config.scan_options(), config.clone())
        .await
        .context("Failed to configure session")?;

    let replay = Replay {
        session: &session,
        pool: &pool,
        clock: &clock,
        frame_timeout: scenario.frame_timeout(),
    };

    match session.start().await {
        Ok(()) => replay.run(&scenario.steps, &mut frame_requests).await,
        Err(e) => warn!(error = %e, "Session failed to start, skipping scenario steps"),
    }

    tokio::time::sleep(SETTLE_DELAY).await;
    let status = session.status().await;
    info!(
        scanning = status.scanning,
        records = status.sync.record_count,
        lock = %status.lock,
        frames_outstanding = pool.outstanding(),
        "Replay finished"
    );

    session.shutdown().await.context("Failed to shut down session")?;
    drop(session);
    debug!(
        syncs = store.syncs_started(),
        store_open = store.is_open(),
        "Reference store released"
    );

    let fatal = printer.await.context("Event printer panicked")?;
    if let Some(message) = fatal {
        anyhow::bail!("Session ended with a fatal error: {}", message);
    }
    Ok(())
}

/// Print events until the bus closes; returns the first fatal error seen
fn spawn_printer(
    mut events: broadcast::Receiver<ScanEvent>,
    pretty: bool,
) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        let mut fatal = None;
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let ScanEvent::FatalError { kind, message, .. } = &event {
                        fatal.get_or_insert_with(|| format!("{}: {}", kind, message));
                    }
                    let line = if pretty {
                        serde_json::to_string_pretty(&event)
                    } else {
                        serde_json::to_string(&event)
                    };
                    match line {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "Failed to serialize event"),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        fatal
    })
}

struct Replay<'a> {
    session: &'a Session,
    pool: &'a FramePool,
    clock: &'a SimClock,
    frame_timeout: Duration,
}

impl Replay<'_> {
    async fn run(&self, steps: &[ScenarioStep], frame_requests: &mut mpsc::UnboundedReceiver<()>) {
        for (index, step) in steps.iter().enumerate() {
            info!(step = index, ?step, "Replaying step");
            match step {
                ScenarioStep::Frames { labels } => self.feed(labels, frame_requests).await,
                ScenarioStep::Start => {
                    if let Err(e) = self.session.start().await {
                        warn!(error = %e, "Restart failed");
                    }
                }
                ScenarioStep::Pause => self.session.pause(),
                ScenarioStep::Cancel => self.session.cancel(),
                ScenarioStep::Sync => self.session.request_sync(),
                ScenarioStep::Snapshot => self.session.request_snapshot_search(),
                ScenarioStep::CancelSnapshot => self.session.cancel_snapshot_search(),
                ScenarioStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
                ScenarioStep::AdvanceClock { secs } => {
                    self.clock.advance(chrono::Duration::seconds(*secs));
                }
            }
        }
    }

    /// Answer one frame request per label
    async fn feed(&self, labels: &[String], frame_requests: &mut mpsc::UnboundedReceiver<()>) {
        for label in labels {
            match tokio::time::timeout(self.frame_timeout, frame_requests.recv()).await {
                Ok(Some(())) => {}
                Ok(None) => return,
                Err(_) => {
                    warn!(label = %label, "No frame requested in time, skipping remaining frames");
                    return;
                }
            }

            match label_frame(self.pool, label, vrs_common::time::now()) {
                Ok(frame) => self.session.submit_frame(frame),
                Err(e) => warn!(label = %label, error = %e, "Invalid scripted frame"),
            }
        }
    }
}
