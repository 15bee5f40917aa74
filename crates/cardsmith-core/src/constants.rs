//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// HTTP client configuration
pub mod http {
    use super::*;

    /// Connection timeout for HTTP requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Request timeout - a single design generation can take tens of seconds
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
}

/// Generation pipeline configuration
pub mod generation {
    /// Lowest accepted design count per request
    pub const MIN_DESIGNS: usize = 1;

    /// Highest accepted design count per request
    pub const MAX_DESIGNS: usize = 10;

    /// Default design count when not configured
    pub const DEFAULT_DESIGN_COUNT: usize = 5;

    /// Provider call attempts before giving up
    pub const MAX_ATTEMPTS: u32 = 3;

    /// How much of a raw model response is mirrored to the debug sink
    pub const RESPONSE_PREVIEW_CHARS: usize = 100;
}

/// Local model runner (Ollama) configuration
pub mod local {
    use super::*;

    /// Timeout for `ollama list`
    pub const LIST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Timeout for `ollama ps`
    pub const PS_TIMEOUT: Duration = Duration::from_secs(3);
}

/// Preference store keys
pub mod prefs {
    /// Last model successfully used through the local runner
    pub const OLLAMA_LAST_USED_MODEL: &str = "ollama.last_used_model";

    /// Last model resolved for the OpenAI-compatible endpoint
    pub const OPENAI_LAST_USED_MODEL: &str = "openai_compatible.last_used_model";
}

/// Filesystem configuration
pub mod fs {
    /// Config directory name under the user's home
    pub const CONFIG_DIR_NAME: &str = ".cardsmith";

    /// Preference store file name
    pub const PREFERENCES_FILE_NAME: &str = "preferences.json";
}
