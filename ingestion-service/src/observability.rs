use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber.
///
/// Without `RUST_LOG`, both workspace crates and the calling binary log at info.
pub fn init_tracing(bin_target: &str) {
    let mut filter = EnvFilter::from_default_env();

    if std::env::var_os("RUST_LOG").is_none() {
        for target in ["leneda_ingestion", "leneda_client", bin_target] {
            match format!("{target}=info").parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("ignoring log directive for '{target}': {e}"),
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
