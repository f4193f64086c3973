use tilecore::LoopConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const FRAME_LIMIT_ENV_VAR: &str = "TILEGAME_FRAME_LIMIT";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Tilegame Startup ===");

    let frame_limit = std::env::var(FRAME_LIMIT_ENV_VAR)
        .ok()
        .and_then(|raw| parse_frame_limit(&raw));
    let config = LoopConfig {
        frame_limit,
        ..LoopConfig::default()
    };

    AppWiring { config }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_frame_limit(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u64>() {
        Ok(limit) => Some(limit),
        Err(_) => {
            warn!(
                env_var = FRAME_LIMIT_ENV_VAR,
                value = trimmed,
                "invalid frame limit; running until quit"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_limit_parses_positive_integers_only() {
        assert_eq!(parse_frame_limit(" 120 "), Some(120));
        assert_eq!(parse_frame_limit(""), None);
        assert_eq!(parse_frame_limit("soon"), None);
        assert_eq!(parse_frame_limit("-3"), None);
    }
}
