//! ---
//! udm_section: "01-core-functionality"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Shared runtime utilities: configuration and logging."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Tracing setup and the spans scoping log output to update activities.
//!
//! Services call [`init_tracing`] once at startup. The orchestration core
//! wraps each activity in [`activity_span`] and each coordination step in
//! [`phase_span`], so every event it emits, including those from the agent
//! invocation tasks it spawns, carries the activity id and phase without
//! repeating them per call site.

use std::fmt::Display;
use std::fs;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Span};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "UDM_LOG";

/// Default filter when neither `UDM_LOG` nor `RUST_LOG` is set: the
/// orchestration core logs phase progression at debug, everything else at
/// info.
const DEFAULT_DIRECTIVE: &str = "info,udm_core=debug";

struct OutputGuards {
    _file: WorkerGuard,
    _stdout: WorkerGuard,
}

static GUARDS: OnceCell<OutputGuards> = OnceCell::new();

/// Available log formats for update manager services.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// JSON lines suited for container log collection.
    #[default]
    StructuredJson,
    /// Human-readable output for interactive use.
    Pretty,
}

/// Initialize the tracing subscriber based on configuration and environment.
///
/// `UDM_LOG` overrides the filter, then `RUST_LOG`, then the default of
/// info-level output with the orchestration core at debug. Stdout carries
/// the configured format; a rolling daily JSON file is kept for post-mortem
/// analysis of update activities. Calling this a second time is a no-op.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "cannot create log directory {}",
            config.directory.display()
        )
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set(OutputGuards {
        _file: file_guard,
        _stdout: stdout_guard,
    });

    tracing_subscriber::registry()
        .with(log_filter())
        .with(stdout_layer(config.format, stdout_writer))
        .with(fmt::layer().with_target(true).json().with_writer(file_writer))
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

fn log_filter() -> EnvFilter {
    for variable in [LOG_ENV, "RUST_LOG"] {
        let Ok(directive) = std::env::var(variable) else {
            continue;
        };
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring invalid {variable} directive: {err}"),
        }
    }
    EnvFilter::new(DEFAULT_DIRECTIVE)
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .json()
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).with_writer(writer).boxed(),
    }
}

/// Root span for one update activity.
///
/// The orchestrator instruments the whole activity with this span, so the
/// activity id reaches every event of the phase loop and of the spawned
/// agent invocations.
pub fn activity_span(activity_id: &str) -> Span {
    tracing::info_span!("update_activity", activity_id = %activity_id)
}

/// Span for a single coordination phase within an activity.
pub fn phase_span(phase: impl Display) -> Span {
    tracing::info_span!("update_phase", phase = %phase)
}
