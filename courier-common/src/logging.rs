use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt::MakeWriter, prelude::__tracing_subscriber_SubscriberExt,
    registry::LookupSpan, util::SubscriberInitExt,
};

use crate::Environment;

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Log an event about the dispatcher itself rather than about a record
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable, coloured, one line per event
    Compact,
    /// One JSON object per event, for log aggregation
    Json,
}

impl From<Environment> for Format {
    fn from(environment: Environment) -> Self {
        if environment.is_local() {
            Self::Compact
        } else {
            Self::Json
        }
    }
}

/// Map a `LOG_LEVEL` value onto a filter.
///
/// Only `DEBUG` and `TRACE` lower the threshold; anything else, including
/// an unset variable, logs at INFO.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    match value.map(str::trim) {
        Some(level) if level.eq_ignore_ascii_case("debug") => LevelFilter::DEBUG,
        Some(level) if level.eq_ignore_ascii_case("trace") => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// Install the global subscriber from `LOG_LEVEL` and `APP_ENV`/`SERVICE_ENV`.
///
/// This runs before settings are loaded, so an unknown environment falls
/// back to JSON output rather than failing.
pub fn init() {
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref());
    let format = std::env::var("APP_ENV")
        .or_else(|_| std::env::var("SERVICE_ENV"))
        .ok()
        .and_then(|env| env.parse::<Environment>().ok())
        .map_or(Format::Json, Format::from);

    init_with(format, level);
}

pub fn init_with(format: Format, level: LevelFilter) {
    let target = FilterFn::new(|metadata| metadata.target().starts_with("courier"));

    let layer = match format {
        Format::Compact => tracing_subscriber::fmt::layer()
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_ansi(true)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
            .with_filter(level)
            .with_filter(target)
            .boxed(),
        Format::Json => json_layer(std::io::stdout)
            .with_filter(level)
            .with_filter(target)
            .boxed(),
    };

    if tracing_subscriber::Registry::default()
        .with(layer)
        .try_init()
        .is_err()
    {
        eprintln!("A global tracing subscriber was already installed");
    }
}

/// JSON lines listing every enclosing span, so nested spans keep the
/// record's `message_id`.
fn json_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .with_writer(writer)
}
