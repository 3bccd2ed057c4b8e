//! Logging setup.
//!
//! Events from the platform client (`twitch_client` target) are written with
//! a `[Twitch]` prefix so they stand out from bridge logs.

use chrono::Local;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields,
        format::{Format, Full, Writer},
        time::FormatTime,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Default level when `LOG_LEVEL` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Prefix for platform client log lines.
const CLIENT_PREFIX: &str = "[Twitch] ";

/// Build the filter directive for `level`.
pub fn default_filter(level: &str) -> String {
    format!("twitch_bridge={level},twitch_client={level},sqlx=warn")
}

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

fn is_client_target(target: &str) -> bool {
    target == "twitch_client" || target.starts_with("twitch_client::")
}

/// Default formatter that prefixes platform client events.
struct ClientPrefixFormat {
    inner: Format<Full, LocalTimer>,
}

impl<S, N> FormatEvent<S, N> for ClientPrefixFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        if is_client_target(event.metadata().target()) {
            write!(writer, "{}", CLIENT_PREFIX)?;
        }
        self.inner.format_event(ctx, writer, event)
    }
}

/// Initialize logging. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(level)))
        .map_err(|e| crate::Error::config(format!("Invalid LOG_LEVEL '{}': {}", level, e)))?;

    let format = ClientPrefixFormat {
        inner: fmt::format().with_timer(LocalTimer),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).event_format(format))
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(())
}
