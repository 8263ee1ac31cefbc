use std::{
    io::{self, ErrorKind},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use sx_clock::HardwareGeneration;
use thiserror::Error as ThisError;
use tracing::{info, warn};

use crate::tracing::LogLevel;

const DEFAULT_CONFIG_PATH: &str = "/etc/sx-clock/sx-clock.toml";

/// A command line argument after combined short flags and `--key=value`
/// assignments have been split up.
#[derive(Debug, PartialEq, Eq)]
pub enum CliArg {
    Flag(String),
    Argument(String, String),
    /// Positional arguments in order, always the last element.
    Rest(Vec<String>),
}

impl CliArg {
    pub fn normalize_arguments<I>(
        takes_argument: &[&str],
        takes_argument_short: &[char],
        iter: I,
    ) -> Result<Vec<Self>, String>
    where
        I: IntoIterator<Item = String>,
    {
        // skip the program name
        let mut args = iter.into_iter().skip(1);
        let mut processed = vec![];
        let mut positional = vec![];

        while let Some(arg) = args.next() {
            if arg == "--" {
                positional.extend(args.by_ref());
            } else if arg.starts_with("--") {
                processed.push(Self::long_option(arg, takes_argument, &mut args)?);
            } else if arg.len() > 1 && arg.starts_with('-') {
                Self::short_options(&arg[1..], takes_argument_short, &mut args, &mut processed)?;
            } else {
                positional.push(arg);
            }
        }

        if !positional.is_empty() {
            processed.push(CliArg::Rest(positional));
        }

        Ok(processed)
    }

    fn long_option(
        arg: String,
        takes_argument: &[&str],
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, String> {
        match arg.split_once('=') {
            Some((key, value)) if takes_argument.contains(&key) => {
                Ok(CliArg::Argument(key.to_string(), value.to_string()))
            }
            Some(_) => Err(format!("invalid option: '{arg}'")),
            None if takes_argument.contains(&arg.as_str()) => match args.next() {
                Some(value) => Ok(CliArg::Argument(arg, value)),
                None => Err(format!("'{arg}' expects an argument")),
            },
            None => Ok(CliArg::Flag(arg)),
        }
    }

    /// Expand `-hc foo` and `-hcfoo` into separate flags. The first option
    /// that takes an argument consumes the remainder of the group, or the
    /// next argument when nothing remains.
    fn short_options(
        group: &str,
        takes_argument: &[char],
        args: &mut impl Iterator<Item = String>,
        processed: &mut Vec<Self>,
    ) -> Result<(), String> {
        for (n, option) in group.char_indices() {
            let flag = format!("-{option}");

            if !takes_argument.contains(&option) {
                processed.push(CliArg::Flag(flag));
                continue;
            }

            let attached = &group[n + option.len_utf8()..];
            let value = if attached.starts_with('=') {
                return Err(format!("'{flag}' does not accept '='"));
            } else if attached.is_empty() {
                args.next().ok_or_else(|| format!("'{flag}' expects an argument"))?
            } else {
                attached.to_string()
            };

            processed.push(CliArg::Argument(flag, value));
            break;
        }

        Ok(())
    }
}

fn default_generation() -> HardwareGeneration {
    HardwareGeneration::Spc2
}

const fn default_device_id() -> u8 {
    1
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DeviceConfig {
    #[serde(default = "default_generation")]
    pub generation: HardwareGeneration,
    /// File exposing the register space of the device through positioned
    /// reads, e.g. `/dev/mem` or a register dump.
    #[serde(default)]
    pub registers: Option<PathBuf>,
    /// Byte offset of the UTC block within `registers`.
    #[serde(default)]
    pub utc_offset: u64,
    #[serde(default = "default_device_id")]
    pub device_id: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            registers: None,
            utc_offset: 0,
            device_id: default_device_id(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_level: Option<LogLevel>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode as libc::mode_t & libc::S_IWOTH != 0 {
            warn!(?path, "config file is writable by others");
        }

        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load the file given on the command line, else the default location,
    /// else the defaults.
    pub fn from_first_file(file: Option<impl AsRef<Path>>) -> Result<Config, ConfigError> {
        if let Some(path) = file {
            let path = path.as_ref();
            info!(?path, "using config file");
            return Config::from_file(path);
        }

        let path = Path::new(DEFAULT_CONFIG_PATH);
        if !path.exists() {
            return Ok(Config::default());
        }

        info!(?path, "using config file at default location");
        match Config::from_file(path) {
            // an unreadable system wide file is not fatal for a read-only tool
            Err(ConfigError::Io(e)) if e.kind() == ErrorKind::PermissionDenied => {
                info!(?path, "no permission to read config file, using defaults");
                Ok(Config::default())
            }
            result => result,
        }
    }

    /// Check that the config can be used to read the clock.
    pub fn check(&self) -> bool {
        let mut ok = true;

        if self.device.registers.is_none() {
            warn!("No register file configured, the hardware clock cannot be read.");
            ok = false;
        }

        if self.device.utc_offset % 4 != 0 {
            warn!(
                utc_offset = self.device.utc_offset,
                "UTC block offset is not 32 bit aligned."
            );
            ok = false;
        }

        ok
    }
}

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] io::Error),
    #[error("could not parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}
