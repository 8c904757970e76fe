//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use clusterstage::observability::LogFormat;
use clusterstage::scenario::{ScenarioKind, SuiteMode};
use clusterstage::stage::StageConfig;

/// Runs the cluster integration suite: build images, deploy and validate
/// every scenario, then tear everything down.
///
/// Any stage can also be skipped with a `SKIP_<stage>` environment variable.
#[derive(Parser, Debug)]
#[command(name = "clusterstage", version, about, long_about = None)]
pub struct Cli {
    /// JSON suite config; `CLUSTERSTAGE_*` variables override it.
    #[arg(short, long, env = "CLUSTERSTAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding persisted state between invocations.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Stage to skip; may be repeated.
    #[arg(long = "skip", value_name = "STAGE")]
    pub skip: Vec<String>,

    /// How many images the suite builds.
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Scenarios to run, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub scenarios: Vec<ScenarioArg>,

    /// Log output format.
    #[arg(long, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Writes the matrix report as JSON to this file.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl Cli {
    /// Stage toggles from the environment, with `--skip` flags layered on top.
    #[must_use]
    pub fn stage_config(&self) -> StageConfig {
        let flags = self
            .skip
            .iter()
            .fold(StageConfig::new(), |config, stage| config.with_skip(stage.as_str()));
        StageConfig::from_env().merge(flags)
    }
}

/// Values of `--mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ModeArg {
    /// One image shared by every scenario.
    SingleImage,
    /// One image per build name.
    MultiVariant,
}

impl From<ModeArg> for SuiteMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::SingleImage => Self::SingleImage,
            ModeArg::MultiVariant => Self::MultiVariant,
        }
    }
}

/// Values of `--scenarios`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioArg {
    /// Servers and clients share one resource group.
    Colocated,
    /// Dedicated server and client groups.
    Separate,
}

impl From<ScenarioArg> for ScenarioKind {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Colocated => Self::Colocated,
            ScenarioArg::Separate => Self::Separate,
        }
    }
}

/// Values of `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable multi-line output.
    Pretty,
    /// Compact single-line output.
    Compact,
    /// One JSON object per line.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Json => Self::Json,
        }
    }
}
