//! Platform abstraction layer
//!
//! Handles browser/native differences for logging setup. Storage and the
//! remote client are injected explicitly; see `local` and `remote`.

/// Install the logger for this target
///
/// Browser builds log to the devtools console and report panics there;
/// native builds use `env_logger`, where `RUST_LOG` overrides `level`.
/// Returns false if a logger was already installed.
#[cfg(target_arch = "wasm32")]
pub fn init_logging(level: log::Level) -> bool {
    console_error_panic_hook::set_once();
    console_log::init_with_level(level).is_ok()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(level: log::Level) -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .try_init()
        .is_ok()
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_logging(log::Level::Debug);
        assert!(!init_logging(log::Level::Debug));
    }
}
