/// Milliseconds since the Unix epoch.
///
/// `SystemTime` is unavailable on `wasm32-unknown-unknown`, so browser builds
/// read the JavaScript clock instead.
pub fn now_millis() -> u64 {
    #[cfg(target_family = "wasm")]
    {
        js_sys::Date::now() as u64
    }
    #[cfg(not(target_family = "wasm"))]
    {
        let dur = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        dur.as_millis() as u64
    }
}

/// Number of milliseconds in `days` days.
pub const fn days_to_millis(days: u64) -> u64 {
    days * 24 * 60 * 60 * 1000
}
