//! Shared HTTP agents.

use std::sync::OnceLock;
use std::time::Duration;

/// Timeout for GitHub API requests.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for installer package downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("setup-macports/", env!("CARGO_PKG_VERSION"));

/// Agent for small API requests.
pub fn api_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| agent_with_timeout(API_TIMEOUT))
}

/// Agent for package downloads.
pub fn download_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| agent_with_timeout(DOWNLOAD_TIMEOUT))
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}
