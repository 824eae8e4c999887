/// Codec used when a caller or service does not name one.
pub const DEFAULT_CODEC_NAME: &str = "bitcode";

/// Name under which the built-in `LoggingFilter` is registered.
pub const LOGGING_FILTER_NAME: &str = "logging";

/// Order of the built-in `LoggingFilter`; low so it wraps every other filter.
pub const LOGGING_FILTER_ORDER: i32 = -1_000;

/// Route the WebSocket server listens on and clients connect to.
pub const DEFAULT_WS_PATH: &str = "/ws";
