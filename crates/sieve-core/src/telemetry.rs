//! Tracing subscriber setup

use crate::config::TelemetryConfig;
use tracing_subscriber::EnvFilter;

/// Install a global subscriber
///
/// `RUST_LOG` wins over `config.filter`. Returns `false` when a subscriber
/// was already installed, which makes repeated calls harmless.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = TelemetryConfig {
            filter: "sieve_core=debug".into(),
            json: true,
        };
        init_tracing(&config);
        assert!(!init_tracing(&TelemetryConfig::default()));
    }
}
