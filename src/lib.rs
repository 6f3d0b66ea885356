pub mod config;
pub mod connection;
pub mod landmark_source;
pub mod normalizer;
pub mod predictor;
pub mod sequence_window;
pub mod types;
pub mod wire;
pub mod worker;

use tracing_subscriber::EnvFilter;

/// Inicializa el logging de los binarios. `RUST_LOG` controla el nivel (por defecto `info`).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .try_init();
}
