use tracing_subscriber::EnvFilter;

/// Installs the JSON subscriber. `LOG_FORMAT=pretty` switches to the
/// human-readable formatter for local runs.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let pretty = std::env::var("LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("pretty"))
        .unwrap_or(false);

    let result = if pretty {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(service = service_name, "logging initialized");
    }
}
