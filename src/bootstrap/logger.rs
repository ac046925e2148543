//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup. The returned [`LogHandle`] can later swap
//! the plain-text sink for a JSON sink without restarting the subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Metadata;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::{FilterFn, filter_fn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, reload};

use crate::error::AppError;

/// Handle to the installed subscriber.
///
/// Both sinks are registered at [`init`] and see every span from then on.
/// Only the open sink emits events.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    text: Arc<AtomicBool>,
    json: Arc<AtomicBool>,
}

impl LogHandle {
    /// Switch event output to the JSON sink at `level`.
    ///
    /// The JSON sink opens before the text sink closes, so no event is dropped
    /// during the switch.
    pub fn install_structured(&self, level: &str) -> Result<(), AppError> {
        let level = parse_level(level)?;
        self.filter
            .reload(EnvFilter::default().add_directive(level.into()))
            .map_err(|e| AppError::Logger(format!("failed to apply structured log level: {e}")))?;

        self.json.store(true, Ordering::Release);
        self.text.store(false, Ordering::Release);
        Ok(())
    }
}

/// Initialise the global tracing subscriber writing to stderr.
///
/// `level` accepts standard level strings: `"error"`, `"warn"`, `"info"`,
/// `"debug"`, `"trace"`.
///
/// If `prefer_level` is `true`, `level` takes precedence and `RUST_LOG` is only
/// used as a fallback when `level` is invalid. If `prefer_level` is `false`,
/// `RUST_LOG` takes precedence and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool) -> Result<LogHandle, AppError> {
    init_with_writer(level, prefer_level, std::io::stderr)
}

/// [`init`] with both sinks writing to `writer`.
pub fn init_with_writer<W>(level: &str, prefer_level: bool, writer: W) -> Result<LogHandle, AppError>
where
    W: for<'a> MakeWriter<'a> + Clone + Send + Sync + 'static,
{
    let filter = if prefer_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(level_err) => EnvFilter::try_from_default_env()
                .map_err(|env_err| {
                    AppError::Logger(format!(
                        "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                    ))
                })?,
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    let (filter_layer, filter) = reload::Layer::new(filter);
    let text = Arc::new(AtomicBool::new(true));
    let json = Arc::new(AtomicBool::new(false));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(writer.clone()).with_filter(gate(Arc::clone(&text))))
        .with(fmt::layer().json().with_writer(writer).with_filter(gate(Arc::clone(&json))))
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(LogHandle { filter, text, json })
}

/// Spans always pass so each sink records their fields; events pass while `open`.
fn gate(open: Arc<AtomicBool>) -> FilterFn<impl Fn(&Metadata<'_>) -> bool> {
    filter_fn(move |meta| meta.is_span() || open.load(Ordering::Acquire))
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
