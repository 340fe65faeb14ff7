use chrono::{DateTime, Local, TimeDelta};
use color_eyre::Result;
use commandbot::config::{config_path, RobotConfig};
use commandbot::container::{compose, Robot};
use commandbot::controller::event_collector::GamepadSource;
use commandbot::controller::frame::InputFrame;
use commandbot::controller::{InputSource, NeutralSource};
use commandbot::subsystem::sim::SimRobot;
use commandbot::subsystem::Drivetrain;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let path = config_path();
    let config = RobotConfig::load_or_default(&path).await?;
    if !tokio::fs::try_exists(&path).await.unwrap_or(true) {
        if let Err(e) = config.save(&path).await {
            warn!("Could not write default config: {}", e);
        }
    }

    let sim = SimRobot::new(config.scheduler.period_secs());
    let mut robot = compose(&config, sim.hardware())?;
    let mut input = open_input();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, stopping"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        token.cancel();
    });

    run(&mut robot, input.as_mut(), &config, &shutdown).await;

    info!("Disabling robot");
    let admission = robot.set_motor_brake(false);
    if !admission.is_admitted() {
        warn!("Coast request not applied: {:?}", admission);
    }
    robot.cancel_all();
    let drive = sim.drivetrain.borrow();
    info!(
        "Final heading {:.3} rad after {} cycles",
        drive.heading(),
        robot.scheduler().cycles()
    );
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn open_input() -> Box<dyn InputSource> {
    match GamepadSource::create() {
        Ok(source) => Box::new(source.initialize()),
        Err(e) => {
            warn!("Gamepads unavailable ({}), driving with neutral input", e);
            Box::new(NeutralSource)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Autonomous { until_cycle: u64 },
    Teleop,
}

/// Cycle timing since the last report
struct LoopStats {
    since: DateTime<Local>,
    cycles: u64,
    overruns: u64,
    worst: TimeDelta,
}

impl LoopStats {
    fn new(now: DateTime<Local>) -> Self {
        Self {
            since: now,
            cycles: 0,
            overruns: 0,
            worst: TimeDelta::zero(),
        }
    }

    fn record(&mut self, elapsed: TimeDelta, overrun: bool) {
        self.cycles += 1;
        self.worst = self.worst.max(elapsed);
        if overrun {
            self.overruns += 1;
        }
    }
}

async fn run(
    robot: &mut Robot,
    input: &mut dyn InputSource,
    config: &RobotConfig,
    shutdown: &CancellationToken,
) {
    let period = TimeDelta::milliseconds(config.scheduler.cycle_period_ms as i64);
    let stats_interval = TimeDelta::seconds(config.scheduler.stats_interval_secs as i64);
    let mut interval = tokio::time::interval(config.scheduler.period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let admission = robot.set_motor_brake(true);
    if !admission.is_admitted() {
        warn!("Brake request not applied: {:?}", admission);
    }
    let mut phase = start_autonomous(robot, config);
    let mut stats = LoopStats::new(Local::now());

    info!(
        "Control loop running every {} ms",
        config.scheduler.cycle_period_ms
    );
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let started = Local::now();
        let frame = match phase {
            Phase::Autonomous { .. } => InputFrame::neutral(),
            Phase::Teleop => input.poll(),
        };
        robot.cycle(&frame);

        if let Phase::Autonomous { until_cycle } = phase {
            if robot.scheduler().cycles() >= until_cycle {
                if let Ok(id) = robot.selected_autonomous() {
                    robot.cancel(id);
                }
                info!("Autonomous period over, teleop enabled");
                phase = Phase::Teleop;
            }
        }

        let now = Local::now();
        let elapsed = now - started;
        let overrun = elapsed > period;
        if overrun {
            warn!(
                "Cycle {} overran: {} ms",
                robot.scheduler().cycles(),
                elapsed.num_milliseconds()
            );
        }
        stats.record(elapsed, overrun);

        if now - stats.since > stats_interval {
            info!(
                "Loop stats: {} cycles in last {} seconds, worst {} us, {} overruns, running: {:?}",
                stats.cycles,
                stats_interval.num_seconds(),
                stats.worst.num_microseconds().unwrap_or(i64::MAX),
                stats.overruns,
                robot
                    .scheduler()
                    .running()
                    .map(|id| robot.scheduler().name(id))
                    .collect::<Vec<_>>()
            );
            stats = LoopStats::new(now);
        }
    }
}

fn start_autonomous(robot: &mut Robot, config: &RobotConfig) -> Phase {
    let cycles = config.scheduler.autonomous_secs * 1000 / config.scheduler.cycle_period_ms;
    if cycles == 0 {
        return Phase::Teleop;
    }
    match robot.selected_autonomous() {
        Ok(id) => {
            let admission = robot.schedule(id);
            info!(
                "Autonomous '{}' started: {:?}",
                config.autonomous.selected, admission
            );
        }
        Err(e) => warn!("{}, autonomous period idles", e),
    }
    debug!(
        "Autonomous phase lasts {} cycles, routines available: {:?}",
        cycles,
        robot.autonomous_routines().collect::<Vec<_>>()
    );
    Phase::Autonomous {
        until_cycle: robot.scheduler().cycles() + cycles,
    }
}
