//! Logger setup for native (env_logger) and web (console_log) builds.

use std::sync::Once;

static INIT: Once = Once::new();

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set.
    pub default_level: log::LevelFilter,
    /// Per-module overrides, e.g. `("wgpu_core", Warn)`.
    pub module_levels: Vec<(String, log::LevelFilter)>,
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: log::LevelFilter::Info,
            module_levels: vec![
                ("wgpu_core".to_string(), log::LevelFilter::Warn),
                ("wgpu_hal".to_string(), log::LevelFilter::Warn),
                ("naga".to_string(), log::LevelFilter::Warn),
            ],
            is_test: false,
        }
    }
}

/// Installs the global logger. Only the first call has an effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        #[cfg(target_arch = "wasm32")]
        {
            let level = config.default_level.to_level().unwrap_or(log::Level::Warn);
            if let Err(e) = console_log::init_with_level(level) {
                log::warn!("Could not initialize logger: {}", e);
            }
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let mut builder = env_logger::Builder::new();
            builder.filter_level(config.default_level);
            for (module, level) in &config.module_levels {
                builder.filter_module(module, *level);
            }
            // RUST_LOG wins over the defaults above
            builder.parse_default_env();
            builder.is_test(config.is_test);
            // another logger may already be installed by the host
            let _ = builder.try_init();
        }
    });
}
