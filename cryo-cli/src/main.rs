//! cryocon - command-line client for CryoCon 22C temperature controllers
//!
//! Every invocation opens a session, runs one subcommand, then unlocks the
//! keypad and closes the port. Ctrl-C during `auto-range` ends the polling
//! loop so the session still disconnects cleanly.

mod cli;
mod settings;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use cryo_protocol::ChannelId;
use cryo_session::{AutoRange, DeviceSession, SerialTransport, Topology, Transport};
use cryo_sim::VirtualController;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::{AutoRangeArgs, Cli, Command};
use settings::Settings;

/// Granularity of the interruptible wait between auto-range passes
const STOP_POLL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let mut settings = Settings::load(cli.global.settings.as_deref());
    cli.global.apply(&mut settings);

    if let Command::SaveSettings = cli.command {
        let path = match &cli.global.settings {
            Some(p) => p.clone(),
            None => Settings::default_path().context("No config directory available")?,
        };
        settings.save_to(&path)?;
        println!("Saved settings to {}", path.display());
        return Ok(());
    }

    let transport: Box<dyn Transport> = if cli.global.simulate {
        info!("Using simulated controller");
        Box::new(VirtualController::from_config(settings.simulator.clone()))
    } else {
        if settings.transport.port.is_empty() {
            bail!("No serial port configured; pass --port or set CRYOCON_PORT");
        }
        if settings.transport.timeout().is_zero() {
            bail!(
                "Invalid reply timeout {}s in settings; pass --timeout",
                settings.transport.timeout_secs
            );
        }
        Box::new(SerialTransport::new(settings.transport.clone()))
    };

    let stop = Arc::new(AtomicBool::new(false));
    if let Command::AutoRange(_) = cli.command {
        install_stop_handler(&stop);
    }

    let mut session = DeviceSession::new(transport, Topology::cryocon_22c());
    session
        .connect()
        .with_context(|| format!("Failed to connect to {}", describe_target(&cli, &settings)))?;

    let result = run(&mut session, &cli.command, &settings, &stop);

    if let Err(e) = session.disconnect() {
        if result.is_ok() {
            return Err(e).context("Failed to disconnect cleanly");
        }
        warn!("Disconnect failed: {}", e);
    }
    result
}

/// Turn Ctrl-C into a stop request instead of killing the process
fn install_stop_handler(stop: &Arc<AtomicBool>) {
    let flag = Arc::clone(stop);
    let installed = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    });
    if let Err(e) = installed {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "cryocon=info,cryo_protocol=info,cryo_session=info,cryo_sim=info",
        1 => "cryocon=debug,cryo_protocol=debug,cryo_session=debug,cryo_sim=debug",
        _ => "cryocon=trace,cryo_protocol=trace,cryo_session=trace,cryo_sim=trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn describe_target(cli: &Cli, settings: &Settings) -> String {
    if cli.global.simulate {
        "simulated controller".to_string()
    } else {
        settings.transport.port.clone()
    }
}

fn run<T: Transport>(
    session: &mut DeviceSession<T>,
    command: &Command,
    settings: &Settings,
    stop: &AtomicBool,
) -> Result<()> {
    match command {
        Command::Status => print_status(session)?,
        Command::Temperature { channel } => {
            let value = session.temperature(channel)?;
            println!("{} {}", value, unit_for(session, channel)?);
        }
        Command::SetPoint { channel } => match session.set_point(channel)? {
            Some(value) => println!("{} {}", value, unit_for(session, channel)?),
            None => println!("Channel {channel} has no control loop"),
        },
        Command::SetTemperature { channel, value } => {
            session.set_temperature(channel, *value)?;
            println!("Set point for {channel} is now {value}");
        }
        Command::Enable => {
            session.enable()?;
            println!("Control enabled");
        }
        Command::Disable => {
            session.disable()?;
            println!("Control disabled");
        }
        Command::Range { loop_id, value } => match value {
            Some(range) => {
                session.set_range(*loop_id, range)?;
                println!("Loop {loop_id} range set to {range}");
            }
            None => println!("{}", session.range(*loop_id)?),
        },
        Command::Output { loop_id } => {
            let output = session.output(*loop_id)?;
            println!("{:.1}%", output * 100.0);
        }
        Command::AutoRange(args) => run_auto_range(session, args, settings, stop)?,
        // Handled before connecting
        Command::SaveSettings => {}
    }
    Ok(())
}

fn unit_for<T: Transport>(session: &DeviceSession<T>, channel: &str) -> Result<String> {
    let Some(id) = session.resolve_channel(channel)? else {
        return Ok(String::new());
    };
    Ok(session.units()?.get(&id).cloned().unwrap_or_default())
}

fn print_status<T: Transport>(session: &mut DeviceSession<T>) -> Result<()> {
    let names = session.channel_names()?.clone();
    let units = session.units()?.clone();
    let loops = session.loops()?.clone();
    let maxima = session.max_temps()?.clone();

    println!("Inputs:");
    for channel in ChannelId::ALL {
        let temperature = session.temperature(channel.token())?;
        println!(
            "  {:<2} {:<16} {:>10} {}",
            channel.token(),
            names.get(&channel).map(String::as_str).unwrap_or(""),
            temperature,
            units.get(&channel).map(String::as_str).unwrap_or(""),
        );
    }

    println!("Loops:");
    for loop_id in session.topology().controlled_loops.clone() {
        let range = session.range(loop_id)?;
        let output = session.output(loop_id)?;
        println!(
            "  {}  source {:<4} max {:<8} range {:<4} output {:.1}%",
            loop_id,
            loops.get(&loop_id).map(String::as_str).unwrap_or("?"),
            maxima.get(&loop_id).copied().unwrap_or(f64::NAN),
            range,
            output * 100.0,
        );
    }

    let state = if session.is_enabled()? { "on" } else { "off" };
    println!("Control: {state}");
    Ok(())
}

fn run_auto_range<T: Transport>(
    session: &mut DeviceSession<T>,
    args: &AutoRangeArgs,
    settings: &Settings,
    stop: &AtomicBool,
) -> Result<()> {
    let auto = AutoRange::new(
        args.low.unwrap_or(settings.auto_range.threshold_low),
        args.high.unwrap_or(settings.auto_range.threshold_high),
    );
    if auto.threshold_low >= auto.threshold_high {
        bail!(
            "Low threshold {} must be below high threshold {}",
            auto.threshold_low,
            auto.threshold_high
        );
    }

    let secs = args.interval.unwrap_or(settings.poll_interval_secs);
    let interval = Duration::try_from_secs_f64(secs)
        .with_context(|| format!("Invalid poll interval {secs}"))?;

    let names: Vec<&str> = args.channels.iter().map(String::as_str).collect();
    let channels = (!names.is_empty()).then_some(names.as_slice());

    info!(
        "Auto-ranging with thresholds {:.2}/{:.2} every {:?}",
        auto.threshold_low, auto.threshold_high, interval
    );

    let mut passes: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        for change in auto.adjust(session, channels)? {
            println!(
                "{}: loop {} output {:.1}% range {} -> {}",
                change.channel,
                change.loop_id,
                change.output * 100.0,
                change.from,
                change.to
            );
        }

        passes += 1;
        if args.cycles.is_some_and(|n| passes >= n) {
            return Ok(());
        }
        if wait_for_stop(stop, interval) {
            break;
        }
    }

    info!("Auto-range stopped after {} passes", passes);
    Ok(())
}

/// Sleep for `interval`, returning early with `true` once `stop` is set
fn wait_for_stop(stop: &AtomicBool, interval: Duration) -> bool {
    let deadline = Instant::now().checked_add(interval);
    loop {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let nap = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                STOP_POLL.min(deadline - now)
            }
            None => STOP_POLL,
        };
        std::thread::sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryo_protocol::LoopId;

    fn simulated_session() -> DeviceSession<VirtualController> {
        let mut session = DeviceSession::new(VirtualController::new(), Topology::cryocon_22c());
        session.connect().unwrap();
        session
    }

    fn auto_range_args(cycles: Option<u64>) -> AutoRangeArgs {
        AutoRangeArgs {
            channels: Vec::new(),
            low: None,
            high: None,
            interval: Some(0.0),
            cycles,
        }
    }

    fn no_stop() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_run_status_and_reads() {
        let mut session = simulated_session();
        let settings = Settings::default();

        run(&mut session, &Command::Status, &settings, &no_stop()).unwrap();
        run(
            &mut session,
            &Command::Temperature { channel: "sample".into() },
            &settings,
            &no_stop(),
        )
        .unwrap();
        run(
            &mut session,
            &Command::Output { loop_id: LoopId::Loop1 },
            &settings,
            &no_stop(),
        )
        .unwrap();
        session.disconnect().unwrap();
    }

    #[test]
    fn test_run_over_boxed_transport() {
        let transport: Box<dyn Transport> = Box::new(VirtualController::new());
        let mut session = DeviceSession::new(transport, Topology::cryocon_22c());
        session.connect().unwrap();

        run(&mut session, &Command::Enable, &Settings::default(), &no_stop()).unwrap();
        assert!(session.is_enabled().unwrap());
        session.disconnect().unwrap();
    }

    #[test]
    fn test_run_set_temperature_rejects_above_max() {
        let mut session = simulated_session();
        let settings = Settings::default();

        let err = run(
            &mut session,
            &Command::SetTemperature { channel: "a".into(), value: 1000.0 },
            &settings,
            &no_stop(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("maximum"), "{err}");
        session.disconnect().unwrap();
    }

    #[test]
    fn test_run_range_write() {
        let mut session = simulated_session();
        let settings = Settings::default();

        run(
            &mut session,
            &Command::Range { loop_id: LoopId::Loop2, value: Some("hi".into()) },
            &settings,
            &no_stop(),
        )
        .unwrap();
        assert_eq!(session.range(LoopId::Loop2).unwrap(), "hi");
        session.disconnect().unwrap();
    }

    #[test]
    fn test_auto_range_inverted_thresholds() {
        let mut session = simulated_session();
        let mut args = auto_range_args(Some(1));
        args.low = Some(0.9);
        args.high = Some(0.1);

        assert!(run_auto_range(&mut session, &args, &Settings::default(), &no_stop()).is_err());
        session.disconnect().unwrap();
    }

    #[test]
    fn test_auto_range_single_pass() {
        let mut session = simulated_session();
        let mut args = auto_range_args(Some(1));
        // Loop 1 sits at 45% output, so a 50% floor steps it down from mid
        args.low = Some(0.5);
        args.channels = vec!["a".into()];

        run_auto_range(&mut session, &args, &Settings::default(), &no_stop()).unwrap();
        assert_eq!(session.range(LoopId::Loop1).unwrap(), "low");
        session.disconnect().unwrap();
    }

    #[test]
    fn test_auto_range_already_stopped_runs_no_pass() {
        let mut session = simulated_session();
        session.transport_mut().clear_commands();
        let stop = AtomicBool::new(true);

        run_auto_range(&mut session, &auto_range_args(None), &Settings::default(), &stop)
            .unwrap();
        assert!(session.transport().commands().is_empty());
        session.disconnect().unwrap();
    }

    #[test]
    fn test_stop_request_ends_auto_range_and_unlocks() {
        let mut session = simulated_session();
        assert!(session.transport().is_locked());

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            flag.store(true, Ordering::SeqCst);
        });

        // an hour between passes: only the stop request can end this
        let mut args = auto_range_args(None);
        args.interval = Some(3600.0);
        let started = Instant::now();
        run_auto_range(&mut session, &args, &Settings::default(), &stop).unwrap();
        stopper.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(30));

        session.disconnect().unwrap();
        assert_eq!(session.transport().commands().last().unwrap(), "system:lock off");
        assert!(!session.transport().is_locked());
    }

    #[test]
    fn test_wait_for_stop() {
        assert!(!wait_for_stop(&no_stop(), Duration::from_millis(10)));
        assert!(wait_for_stop(&AtomicBool::new(true), Duration::from_secs(3600)));
        assert!(wait_for_stop(&AtomicBool::new(true), Duration::MAX));
    }
}
