/// Returns the current timestamp in microseconds since the UNIX epoch
/// (January 1, 1970).
///
/// If the system clock reports a time before the epoch, `0` is returned.
///
/// # Example:
/// ```rust
/// use skein::utils::now;
/// let timestamp = now(); // Gets the current time in microseconds
/// assert!(timestamp > 0);
/// ```
pub fn now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
