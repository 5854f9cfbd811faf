//! Clap derive structures for the `cryocon` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cryo_protocol::LoopId;

use crate::settings::Settings;

/// cryocon -- drive a CryoCon 22C temperature controller
#[derive(Debug, Parser)]
#[command(
    name = "cryocon",
    version,
    about = "Read and control a CryoCon 22C temperature controller",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Serial port of the controller
    #[arg(long, short = 'p', env = "CRYOCON_PORT", global = true)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(long, short = 'b', global = true)]
    pub baud: Option<u32>,

    /// Reply timeout in seconds
    #[arg(long, short = 't', global = true, value_parser = parse_timeout)]
    pub timeout: Option<f64>,

    /// Talk to a simulated controller instead of a serial port
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(long, env = "CRYOCON_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalOpts {
    /// Overlay command-line values onto loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(port) = &self.port {
            settings.transport.port = port.clone();
        }
        if let Some(baud) = self.baud {
            settings.transport.baud_rate = baud;
        }
        if let Some(timeout) = self.timeout {
            settings.transport.timeout_secs = timeout;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show inputs, loops, units, maxima and control state
    Status,

    /// Read the temperature of a channel
    #[command(alias = "temp")]
    Temperature {
        /// Channel name (a, b, cha, or the name set on the device)
        channel: String,
    },

    /// Read the set point of the loop controlling a channel
    SetPoint { channel: String },

    /// Write the set point of the loop controlling a channel
    SetTemperature {
        channel: String,
        /// New set point, in the channel's units
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Engage control
    Enable,

    /// Disengage control
    Disable,

    /// Read or write the heater range of a loop
    Range {
        /// Loop number (1-4)
        #[arg(value_parser = parse_loop)]
        loop_id: LoopId,
        /// New range (low, mid, hi)
        value: Option<String>,
    },

    /// Read the heater output of a loop
    Output {
        #[arg(value_parser = parse_loop)]
        loop_id: LoopId,
    },

    /// Adjust heater ranges from output power
    AutoRange(AutoRangeArgs),

    /// Write the effective settings to the settings file
    SaveSettings,
}

#[derive(Debug, Args)]
pub struct AutoRangeArgs {
    /// Channels to adjust (default: all)
    pub channels: Vec<String>,

    /// Lower output threshold (fraction of full power)
    #[arg(long)]
    pub low: Option<f64>,

    /// Upper output threshold (fraction of full power)
    #[arg(long)]
    pub high: Option<f64>,

    /// Seconds between passes
    #[arg(long, short = 'i', value_parser = parse_interval)]
    pub interval: Option<f64>,

    /// Number of passes to run (default: run until Ctrl-C)
    #[arg(long, short = 'n', value_parser = clap::value_parser!(u64).range(1..))]
    pub cycles: Option<u64>,
}

fn parse_loop(s: &str) -> Result<LoopId, String> {
    s.parse::<LoopId>().map_err(|e| e.to_string())
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("`{s}` is not a number of seconds"))?;
    if !secs.is_finite() {
        return Err(format!("`{s}` is not a finite number of seconds"));
    }
    Ok(secs)
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let secs = parse_seconds(s)?;
    if secs < 0.001 {
        return Err("timeout must be at least 0.001 seconds".to_string());
    }
    Ok(secs)
}

fn parse_interval(s: &str) -> Result<f64, String> {
    let secs = parse_seconds(s)?;
    if secs < 0.0 {
        return Err("interval cannot be negative".to_string());
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_set_temperature() {
        let cli = Cli::try_parse_from(["cryocon", "-p", "/dev/ttyUSB0", "set-temperature", "a", "-4.5"])
            .unwrap();
        assert_eq!(cli.global.port.as_deref(), Some("/dev/ttyUSB0"));
        assert!(matches!(
            cli.command,
            Command::SetTemperature { ref channel, value } if channel == "a" && value == -4.5
        ));
    }

    #[test]
    fn test_parse_range_loop() {
        let cli = Cli::try_parse_from(["cryocon", "range", "2", "hi"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Range { loop_id: LoopId::Loop2, value: Some(ref v) } if v == "hi"
        ));
        assert!(Cli::try_parse_from(["cryocon", "range", "5"]).is_err());
    }

    #[test]
    fn test_timeout_must_be_positive() {
        assert!(Cli::try_parse_from(["cryocon", "status", "--timeout", "0"]).is_err());
        assert!(Cli::try_parse_from(["cryocon", "status", "--timeout=-1"]).is_err());
        assert!(Cli::try_parse_from(["cryocon", "status", "--timeout", "nan"]).is_err());
        assert!(Cli::try_parse_from(["cryocon", "status", "--timeout", "0.5"]).is_ok());
    }

    #[test]
    fn test_auto_range_bounds() {
        assert!(Cli::try_parse_from(["cryocon", "auto-range", "--cycles", "0"]).is_err());
        assert!(Cli::try_parse_from(["cryocon", "auto-range", "--interval=-2"]).is_err());

        let cli = Cli::try_parse_from(["cryocon", "auto-range", "-n", "3", "-i", "0", "a"])
            .unwrap();
        let Command::AutoRange(args) = cli.command else {
            panic!("expected auto-range");
        };
        assert_eq!(args.cycles, Some(3));
        assert_eq!(args.interval, Some(0.0));
        assert_eq!(args.channels, ["a"]);
    }

    #[test]
    fn test_global_opts_override_settings() {
        let cli = Cli::try_parse_from([
            "cryocon", "status", "--port", "COM4", "--baud", "19200", "--timeout", "2.5",
        ])
        .unwrap();
        let mut settings = Settings::default();
        cli.global.apply(&mut settings);

        assert_eq!(settings.transport.port, "COM4");
        assert_eq!(settings.transport.baud_rate, 19200);
        assert_eq!(settings.transport.timeout_secs, 2.5);
    }
}
