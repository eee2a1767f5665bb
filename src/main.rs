use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

use magfield::export::clipboard_text;
use magfield::providers::termux::{CALIBRATED_QUERY, RAW_QUERY};
use magfield::providers::{
    HeadingProvider, SimulatedFieldProvider, SimulatedHeadingProvider, TermuxFieldProvider,
    UnsupportedHeading,
};
use magfield::{ControllerConfig, FieldUnit, LiveStatus, Mode, SensorModeController, SensorPlatform};

#[derive(Parser, Debug)]
#[command(name = "magfield")]
#[command(about = "Live magnetometer and compass readings", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Field source to request (calibrated, raw)
    #[arg(long, default_value = "calibrated")]
    mode: Mode,

    /// Sensor backend (simulated, termux)
    #[arg(long, default_value = "simulated")]
    source: String,

    /// Display unit (ut, nt, g, mg)
    #[arg(long, default_value = "ut")]
    unit: FieldUnit,

    /// Flip between calibrated and raw every N seconds (0 = never)
    #[arg(long, default_value = "0")]
    toggle_secs: u64,

    /// Pretend the calibrated stream is missing (simulated source only)
    #[arg(long)]
    no_calibrated: bool,

    /// Magnetic declination for simulated true heading, degrees east
    #[arg(long)]
    declination: Option<f64>,

    /// Print each published snapshot as a JSON line
    #[arg(long)]
    json: bool,

    /// Reported heading accuracy in degrees (simulated source only, 0 = unknown)
    #[arg(long)]
    heading_accuracy: Option<f64>,

    /// Sensor sample period in milliseconds
    #[arg(long, default_value = "10")]
    sample_ms: u64,

    /// Minimum spacing between mode transitions in milliseconds
    #[arg(long, default_value = "250")]
    guard_ms: u64,

    /// Minimum spacing of published field readings in milliseconds
    #[arg(long, default_value = "50")]
    publish_ms: u64,
}

async fn build_platform(args: &Args) -> Result<SensorPlatform> {
    let period = Duration::from_millis(args.sample_ms.max(1));

    match args.source.as_str() {
        "simulated" => {
            let calibrated = SimulatedFieldProvider::calibrated().with_stream(period);
            let calibrated = if args.no_calibrated {
                calibrated.unavailable()
            } else {
                calibrated
            };
            let mut heading = SimulatedHeadingProvider::new().with_stream(Duration::from_millis(500));
            if let Some(declination) = args.declination {
                heading = heading.with_declination(declination);
            }
            if let Some(accuracy) = args.heading_accuracy {
                heading = heading.with_accuracy(accuracy);
            }
            Ok(SensorPlatform::new(
                Arc::new(calibrated),
                Arc::new(SimulatedFieldProvider::raw().with_stream(period)),
                Arc::new(heading),
            ))
        }
        "termux" => {
            let heading: Arc<dyn HeadingProvider> = Arc::new(UnsupportedHeading);
            let calibrated = TermuxFieldProvider::detect(CALIBRATED_QUERY, true, period).await;
            let raw = TermuxFieldProvider::detect(RAW_QUERY, false, period).await;
            if calibrated.sensor().is_none() && raw.sensor().is_none() {
                log::warn!("no termux magnetometer found, readings will stay empty");
            }
            Ok(SensorPlatform::new(Arc::new(calibrated), Arc::new(raw), heading))
        }
        other => anyhow::bail!("unknown source '{}' (expected simulated or termux)", other),
    }
}

fn status_line(status: &LiveStatus, unit: FieldUnit) -> String {
    let field = match &status.reading {
        Some(r) => format!(
            "x={} y={} z={} |B|={}",
            unit.format(r.x),
            unit.format(r.y),
            unit.format(r.z),
            unit.format(r.magnitude)
        ),
        None => "no field data".to_string(),
    };
    let heading = match &status.heading {
        Some(h) => match h.precise_accuracy() {
            Some(acc) => format!("hdg={:.1}° ±{:.0}°", h.best_heading(), acc),
            None => format!("hdg={:.1}°", h.best_heading()),
        },
        None => "hdg=--".to_string(),
    };
    let calibration = status
        .calibration
        .map(|q| format!(" cal={}", q))
        .unwrap_or_default();
    let fallback = if status.is_fallback() { " (fallback)" } else { "" };

    format!(
        "[{}] {} {}{} | {} {}{}",
        Utc::now().format("%H:%M:%S%.3f"),
        status.phase,
        status.active_mode,
        fallback,
        field,
        heading,
        calibration
    )
}

fn flip(mode: Mode) -> Mode {
    match mode {
        Mode::Calibrated => Mode::Raw,
        Mode::Raw => Mode::Calibrated,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!(
        "magfield starting: source={} mode={} unit={} duration={}s",
        args.source,
        args.mode,
        args.unit,
        args.duration
    );

    let platform = build_platform(&args).await?;
    let config = ControllerConfig::default()
        .with_transition_guard(Duration::from_millis(args.guard_ms))
        .with_publish_interval(Duration::from_millis(args.publish_ms));
    let controller = SensorModeController::spawn(platform, config, args.mode);
    let mut status_rx = controller.subscribe();
    controller.start();

    let deadline = async {
        if args.duration > 0 {
            sleep(Duration::from_secs(args.duration)).await
        } else {
            std::future::pending::<()>().await
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut toggle = interval(Duration::from_secs(args.toggle_secs.max(1)));
    toggle.set_missed_tick_behavior(MissedTickBehavior::Delay);
    toggle.tick().await;

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if args.json {
                    println!("{}", serde_json::to_string(&status)?);
                } else {
                    println!("{}", status_line(&status, args.unit));
                }
            }
            _ = toggle.tick(), if args.toggle_secs > 0 => {
                let next = flip(controller.requested_mode());
                if !controller.request_mode(next) {
                    log::info!("mode change to {} dropped, transition in flight", next);
                }
            }
            _ = &mut ctrl_c => {
                log::info!("interrupted");
                break;
            }
            _ = &mut deadline => {
                log::info!("duration reached");
                break;
            }
        }
    }

    controller.stop();
    sleep(Duration::from_millis(50)).await;

    println!("\n{}", clipboard_text(&controller.snapshot(), args.unit, Utc::now()));
    Ok(())
}
