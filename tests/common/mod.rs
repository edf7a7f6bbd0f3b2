#![allow(dead_code)]

pub mod idp;

pub mod tracing {
    use tracing_subscriber::EnvFilter;

    pub fn init_subscriber() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,oidc_relying_party=trace"));
        // Every test calls this. Only the first one wins.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}
