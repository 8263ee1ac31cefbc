use std::{
    path::PathBuf,
    process::ExitCode,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use sx_clock::{
    ClockError, DeviceId, HardwareClock, HardwareGeneration, HardwareTimestamp, TracingAuditLog,
    TruncatedTimestamp,
};
use tracing_subscriber::util::SubscriberInitExt;

use crate::{
    config::{CliArg, Config},
    registers::{FileRegisters, ReadOnlyTransport},
    tracing::{tracing_init, LogLevel},
};

const USAGE_MSG: &str = "\
usage: sx-clock-ctl validate [-c PATH]
       sx-clock-ctl dump [-f FORMAT] [-c PATH]
       sx-clock-ctl reconcile SECONDS NANOSECONDS [-c PATH]
       sx-clock-ctl -h | sx-clock-ctl -v";

const DESCRIPTOR: &str = "sx-clock-ctl - inspect the hardware clock of a Spectrum switch";

const HELP_MSG: &str = "Options:
  -f, --format=FORMAT                  which format to use for the dump [plain, json]
  -c, --config=CONFIG                  which configuration file to read the device from
  -l, --log-level=LOG_LEVEL            change the log level
  -h, --help                           display this help text
  -v, --version                        display version information";

pub fn long_help_message() -> String {
    format!("{DESCRIPTOR}\n\n{USAGE_MSG}\n\n{HELP_MSG}")
}

#[derive(Debug, Default, PartialEq, Eq)]
enum Format {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum SxClockCtlAction {
    #[default]
    Help,
    Version,
    Validate,
    Dump,
    Reconcile(TruncatedTimestamp),
}

#[derive(Debug, Default)]
pub(crate) struct SxClockCtlOptions {
    config: Option<PathBuf>,
    format: Format,
    log_level: Option<LogLevel>,
    help: bool,
    version: bool,
    validate: bool,
    dump: bool,
    reconcile: Option<TruncatedTimestamp>,
    action: SxClockCtlAction,
}

impl SxClockCtlOptions {
    const TAKES_ARGUMENT: &'static [&'static str] = &["--config", "--format", "--log-level"];
    const TAKES_ARGUMENT_SHORT: &'static [char] = &['c', 'f', 'l'];

    /// parse an iterator over command line arguments
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str> + Clone,
    {
        let mut options = SxClockCtlOptions::default();

        let it = iter.into_iter().map(|x| x.as_ref().to_string());

        let arg_iter =
            CliArg::normalize_arguments(Self::TAKES_ARGUMENT, Self::TAKES_ARGUMENT_SHORT, it)?;

        for arg in arg_iter {
            match arg {
                CliArg::Flag(flag) => match flag.as_str() {
                    "-h" | "--help" => {
                        options.help = true;
                    }
                    "-v" | "--version" => {
                        options.version = true;
                    }
                    option => {
                        Err(format!("invalid option provided: {option}"))?;
                    }
                },
                CliArg::Argument(option, value) => match option.as_str() {
                    "-c" | "--config" => {
                        options.config = Some(PathBuf::from(value));
                    }
                    "-f" | "--format" => match value.as_str() {
                        "plain" => options.format = Format::Plain,
                        "json" => options.format = Format::Json,
                        _ => Err(format!("invalid format option provided: {value}"))?,
                    },
                    "-l" | "--log-level" => {
                        let level = LogLevel::from_str(&value).map_err(|e| e.to_string())?;
                        options.log_level = Some(level);
                    }
                    option => {
                        Err(format!("invalid option provided: {option}"))?;
                    }
                },
                CliArg::Rest(rest) => {
                    let mut commands = rest.into_iter();
                    match commands.next().as_deref() {
                        Some("validate") => options.validate = true,
                        Some("dump") => options.dump = true,
                        Some("reconcile") => {
                            options.reconcile = Some(parse_truncated_timestamp(
                                commands.next(),
                                commands.next(),
                            )?)
                        }
                        Some(unknown) => eprintln!("Warning: Unknown command {unknown}"),
                        None => {}
                    }

                    if commands.next().is_some() {
                        eprintln!("Warning: Too many commands provided.")
                    }
                }
            }
        }

        options.resolve_action();

        Ok(options)
    }

    /// from the arguments resolve which action should be performed
    fn resolve_action(&mut self) {
        if self.help {
            self.action = SxClockCtlAction::Help;
        } else if self.version {
            self.action = SxClockCtlAction::Version;
        } else if self.validate {
            self.action = SxClockCtlAction::Validate;
        } else if self.dump {
            self.action = SxClockCtlAction::Dump;
        } else if let Some(cqe_ts) = self.reconcile {
            self.action = SxClockCtlAction::Reconcile(cqe_ts);
        } else {
            self.action = SxClockCtlAction::Help;
        }
    }
}

fn parse_truncated_timestamp(
    seconds: Option<String>,
    nanos: Option<String>,
) -> Result<TruncatedTimestamp, String> {
    let (Some(seconds), Some(nanos)) = (seconds, nanos) else {
        return Err("'reconcile' expects SECONDS and NANOSECONDS".into());
    };

    let seconds = seconds
        .parse::<u8>()
        .map_err(|_| format!("invalid truncated seconds '{seconds}', expected 0-255"))?;
    let nanos = nanos
        .parse::<u32>()
        .ok()
        .filter(|nanos| *nanos < 1 << 30)
        .ok_or_else(|| format!("invalid nanoseconds '{nanos}'"))?;

    Ok(TruncatedTimestamp::new(seconds, nanos))
}

type CtlClock = HardwareClock<FileRegisters, ReadOnlyTransport, TracingAuditLog>;

fn open_clock(config: &Config) -> Result<CtlClock, String> {
    let device = &config.device;
    let Some(path) = &device.registers else {
        return Err("no register file configured".into());
    };

    let registers = FileRegisters::open(path, device.utc_offset)
        .map_err(|e| format!("could not open {}: {e}", path.display()))?;

    let clock = HardwareClock::new(
        DeviceId(device.device_id),
        registers,
        ReadOnlyTransport,
        TracingAuditLog,
    );
    clock
        .initialize(device.generation)
        .map_err(|e| e.to_string())?;

    Ok(clock)
}

#[derive(Debug, Serialize)]
struct HostTime {
    seconds: u64,
    nanos: u32,
}

#[derive(Debug, Serialize)]
struct DumpOutput {
    generation: HardwareGeneration,
    hardware: HardwareTimestamp,
    host: HostTime,
}

fn dump(clock: &CtlClock, format: Format) -> Result<String, String> {
    let host_now = SystemTime::now();

    match format {
        Format::Plain => clock.dump(host_now).map_err(|e| e.to_string()),
        Format::Json => {
            let host = host_now.duration_since(UNIX_EPOCH).unwrap_or_default();
            let output = DumpOutput {
                generation: clock
                    .generation()
                    .ok_or_else(|| ClockError::Uninitialized.to_string())?,
                hardware: clock.get_time().map_err(|e| e.to_string())?,
                host: HostTime {
                    seconds: host.as_secs(),
                    nanos: host.subsec_nanos(),
                },
            };

            serde_json::to_string_pretty(&output)
                .map(|json| json + "\n")
                .map_err(|e| e.to_string())
        }
    }
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn main() -> std::io::Result<ExitCode> {
    let options = match SxClockCtlOptions::try_parse_from(std::env::args()) {
        Ok(options) => options,
        Err(msg) => return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)),
    };

    match options.action {
        SxClockCtlAction::Help => {
            println!("{}", long_help_message());
            return Ok(ExitCode::SUCCESS);
        }
        SxClockCtlAction::Version => {
            eprintln!("sx-clock-ctl {VERSION}");
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    // Only the command line level is known while the config is loaded.
    let config_tracing = tracing_init(options.log_level.unwrap_or(LogLevel::Warn), false);
    let config = ::tracing::subscriber::with_default(config_tracing, || {
        Config::from_first_file(options.config.as_ref())
    });

    // The command line takes precedence over the configured log level.
    let log_level = options
        .log_level
        .or_else(|| {
            config
                .as_ref()
                .ok()
                .and_then(|config| config.observability.log_level)
        })
        .unwrap_or(LogLevel::Warn);
    tracing_init(log_level, false).init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Could not load configuration: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    if options.action == SxClockCtlAction::Validate {
        return if config.check() {
            eprintln!("Config looks good");
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        };
    }

    let clock = match open_clock(&config) {
        Ok(clock) => clock,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let output = match options.action {
        SxClockCtlAction::Reconcile(cqe_ts) => clock
            .reconcile(cqe_ts)
            .map(|utc| format!("{utc}\n"))
            .map_err(|e| e.to_string()),
        _ => dump(&clock, options.format),
    };

    match output {
        Ok(output) => {
            print!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
