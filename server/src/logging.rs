use crate::config::LogFormat;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over the defaults below.
pub fn setup_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(format)));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber.with(fmt::layer().json()).init(),
        LogFormat::Pretty => subscriber.with(fmt::layer()).init(),
    }
}

/// JSON output is meant for log shippers, so it stays at `info`; the
/// readable format is for local runs and shows the forwarding details.
fn default_directives(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Json => "info",
        LogFormat::Pretty => "ephemock_server=debug,tower_http=debug",
    }
}
