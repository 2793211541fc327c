use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Send tracing output to stderr.
///
/// `ping` redraws the whole screen on stdout after every sample, so only
/// warnings get through unless `RUST_LOG` asks for more. `RUST_LOG=debug`
/// shows each probe outcome and every dropped late sample; redirect stderr
/// to a file (`2>webping.log`) to read them without tearing the table.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(layer).init();
}
