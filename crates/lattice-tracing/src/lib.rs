//! Subscriber setup and performance spans shared by the lattice crates
//!
//! Binaries, test suites and benches go through [`init_global_tracing`] so
//! every process resolves filters and output format the same way, and so the
//! [`performance`] span policy is applied before the first dispatch.
//!
//! ```rust,no_run
//! use lattice_tracing::{init_global_tracing, TracingConfig};
//!
//! init_global_tracing(&TracingConfig::from_env()).ok();
//! ```

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;
use std::str::FromStr;

pub use tracing::{debug, error, info, trace, warn};

#[doc(hidden)]
pub use tracing;

use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

const PROFILE_VAR: &str = "LATTICE_TRACING_PROFILE";
const DIRECTIVES_VAR: &str = "LATTICE_TRACING_DIRECTIVES";
const FORMAT_VAR: &str = "LATTICE_TRACING_FORMAT";
const PERF_VAR: &str = "LATTICE_PERF_TRACING";
const PERF_THRESHOLD_VAR: &str = "LATTICE_PERF_THRESHOLD_US";

/// Directives enabling launch, transfer and assignment events
const DISPATCH_DEBUG: &str = "lattice_backends=debug,lattice_core=debug";

pub type LayerBox = Box<dyn Layer<Registry> + Send + Sync>;

/// Named starting points for a [`TracingConfig`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingProfile {
    /// Pretty, coloured; perf spans in debug builds
    #[default]
    Local,
    /// JSON, no colour, no perf spans
    Ci,
    /// JSON with span-close timings and dispatch-level debug events
    Performance,
}

impl FromStr for TracingProfile {
    type Err = TracingSetupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "" => Ok(Self::Local),
            "ci" => Ok(Self::Ci),
            "performance" | "perf" => Ok(Self::Performance),
            other => Err(TracingSetupError::UnknownProfile(other.to_string())),
        }
    }
}

/// Formatter layer flavours
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl FromStr for TracingOutput {
    type Err = TracingSetupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TracingSetupError::UnknownFormat(other.to_string())),
        }
    }
}

impl TracingOutput {
    fn layer(self, targets: bool, ansi: bool, span_events: FmtSpan) -> LayerBox {
        let base = tracing_fmt::layer().with_target(targets).with_span_events(span_events);
        match self {
            Self::Compact => Box::new(base.compact().with_ansi(ansi)),
            Self::Pretty => Box::new(base.pretty().with_ansi(ansi)),
            // escape codes would corrupt the JSON records
            Self::Json => Box::new(base.json().with_ansi(false)),
        }
    }
}

/// How the process-wide subscriber is assembled
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Explicit filter such as `lattice_core=trace,info`; overrides `RUST_LOG`
    pub directives: Option<String>,
    /// Used when neither `directives` nor `RUST_LOG` is set or valid
    pub default_directive: String,
    pub include_targets: bool,
    pub ansi: bool,
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Gate for [`performance::PerformanceSpan`] reporting
    pub enable_performance_tracing: bool,
    /// Spans shorter than this are not reported; `None` reports all
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::preset(TracingProfile::Local)
    }
}

impl TracingConfig {
    pub fn preset(profile: TracingProfile) -> Self {
        let json = !matches!(profile, TracingProfile::Local);
        Self {
            directives: matches!(profile, TracingProfile::Performance).then(|| DISPATCH_DEBUG.to_string()),
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: !json,
            span_events: match profile {
                TracingProfile::Performance => FmtSpan::CLOSE,
                _ => FmtSpan::NONE,
            },
            output: if json { TracingOutput::Json } else { TracingOutput::Pretty },
            enable_performance_tracing: match profile {
                TracingProfile::Local => cfg!(debug_assertions),
                TracingProfile::Ci => false,
                TracingProfile::Performance => true,
            },
            performance_threshold_us: None,
        }
    }

    pub fn for_local() -> Self {
        Self::preset(TracingProfile::Local)
    }

    pub fn for_ci() -> Self {
        Self::preset(TracingProfile::Ci)
    }

    pub fn for_performance() -> Self {
        Self::preset(TracingProfile::Performance)
    }

    /// Start from `LATTICE_TRACING_PROFILE` and apply overrides.
    ///
    /// | variable | effect |
    /// |---|---|
    /// | `LATTICE_TRACING_PROFILE` | `local` (default), `ci`, `performance` |
    /// | `LATTICE_TRACING_DIRECTIVES` | replaces the filter |
    /// | `LATTICE_TRACING_FORMAT` | `pretty`, `compact`, `json` |
    /// | `LATTICE_PERF_TRACING` | `true`/`1`/`yes` enables perf spans |
    /// | `LATTICE_PERF_THRESHOLD_US` | minimum reported span duration |
    ///
    /// Unrecognised values are ignored with a note on stderr, since no
    /// subscriber exists yet to report them.
    pub fn from_env() -> Self {
        let profile = env_value(PROFILE_VAR)
            .and_then(|raw| parse_or_note(PROFILE_VAR, &raw))
            .unwrap_or_default();
        let mut config = Self::preset(profile);

        if let Some(directives) = env_value(DIRECTIVES_VAR) {
            config.directives = Some(directives);
        }
        if let Some(output) = env_value(FORMAT_VAR).and_then(|raw| parse_or_note::<TracingOutput>(FORMAT_VAR, &raw)) {
            config.output = output;
            config.ansi &= output != TracingOutput::Json;
        }
        if let Some(flag) = env_value(PERF_VAR) {
            config.enable_performance_tracing = matches!(flag.to_ascii_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(threshold) = env_value(PERF_THRESHOLD_VAR).and_then(|raw| parse_or_note(PERF_THRESHOLD_VAR, &raw)) {
            config.performance_threshold_us = Some(threshold);
        }

        config
    }

    fn filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Trimmed, non-empty value of `key`
fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or_note<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    let parsed = raw.parse().ok();
    if parsed.is_none() {
        eprintln!("lattice-tracing: ignoring {key}={raw:?}");
    }
    parsed
}

#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    #[error("unknown tracing profile: {0}")]
    UnknownProfile(String),

    #[error("unknown tracing format: {0}")]
    UnknownFormat(String),

    /// Usually a subscriber was already installed
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] TryInitError),
}

/// Subscriber for `config`, not yet installed
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let (filter, layer) = subscriber_layers(config)?;
    Ok(Registry::default().with(layer).with(filter))
}

/// Filter and formatter layer, for callers composing their own registry
pub fn subscriber_layers(config: &TracingConfig) -> Result<(EnvFilter, LayerBox), TracingSetupError> {
    let filter = config.filter()?;
    let layer = config
        .output
        .layer(config.include_targets, config.ansi, config.span_events.clone());
    Ok((filter, layer))
}

/// Install `config` process-wide and apply its performance-span policy
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    performance::configure(config.enable_performance_tracing, config.performance_threshold_us);
    build_subscriber(config)?.try_init()?;
    Ok(())
}
