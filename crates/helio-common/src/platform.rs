use std::path::PathBuf;

/// Returns the default kernel-artifact cache directory.
///
/// Search order follows platform conventions:
/// - Linux/macOS: `$XDG_CACHE_HOME/helio`, falling back to `$HOME/.cache/helio`
/// - Windows: `%LOCALAPPDATA%\Helio\cache`
pub fn default_cache_dir() -> PathBuf {
    #[cfg(unix)]
    {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            return PathBuf::from(xdg).join("helio");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".cache").join("helio");
        }
        std::env::temp_dir().join("helio-cache")
    }
    #[cfg(windows)]
    {
        let base = std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        base.join("Helio").join("cache")
    }
}

/// Returns the platform name string.
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "windows")]
    { "windows" }
    #[cfg(target_os = "linux")]
    { "linux" }
    #[cfg(target_os = "macos")]
    { "macos" }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    { "unknown" }
}
