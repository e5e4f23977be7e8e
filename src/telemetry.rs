use std::env;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber once. Logging is opt-in through
/// `verbose` or the `VOICECAP_LOG` environment variable; output goes to
/// stderr so it never mixes with device listings on stdout.
pub fn init_tracing(verbose: bool) {
    let enabled = verbose || env::var_os("VOICECAP_LOG").is_some();
    if !enabled {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stderr)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
