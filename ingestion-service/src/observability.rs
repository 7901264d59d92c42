use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "tauron_reader=info,energy_store=info";
const VERBOSE_DIRECTIVES: &str = "tauron_reader=debug,energy_store=debug";

/// `RUST_LOG` wins when set; otherwise `--verbose` picks debug for our crates.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_DIRECTIVES
    } else {
        DEFAULT_DIRECTIVES
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
