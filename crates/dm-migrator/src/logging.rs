use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "dm_migrator=info,dm_platform=info,dm_dns=info,dm_legacy=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Later calls are no-ops, so tests and binaries can both call it.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init(false);
        init(true);
        tracing::info!("logging initialised");
    }
}
