use std::env;

/// Runtime configuration for the detection backend
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port to bind (default: 3000)
    pub port: u16,

    /// Maximum upload size in bytes (default: 100 MB)
    pub max_file_size: usize,

    /// Directory for uploaded files awaiting analysis (default: "uploads")
    pub upload_dir: String,

    /// Directory for analysis scratch files (default: "temp")
    pub temp_dir: String,

    /// Directory for the flat-file result cache (default: "cache")
    pub cache_dir: String,

    /// Delete uploaded files this many minutes after creation (default: 30)
    pub file_max_age_minutes: u64,

    /// Hard cap on files kept across upload/temp dirs (default: 100)
    pub max_stored_files: usize,

    /// Cleanup sweep interval in minutes (default: 5)
    pub cleanup_interval_minutes: u64,

    /// Seconds to wait before deleting a file after its analysis (default: 5)
    pub delete_after_analysis_secs: u64,

    /// Result-cache entry lifetime in hours (default: 24)
    pub cache_max_age_hours: u64,

    /// Result-cache aggregate size bound in bytes (default: 100 MB)
    pub cache_max_size: u64,

    /// Block IPs at the lower suspicion threshold and never exempt
    /// loopback (default: false)
    pub strict_security: bool,

    /// Expose /api/security debug routes (default: true)
    pub debug_routes: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_file_size: 100 * 1024 * 1024, // 100 MB
            upload_dir: "uploads".to_string(),
            temp_dir: "temp".to_string(),
            cache_dir: "cache".to_string(),
            file_max_age_minutes: 30,
            max_stored_files: 100,
            cleanup_interval_minutes: 5,
            delete_after_analysis_secs: 5,
            cache_max_age_hours: 24,
            cache_max_size: 100 * 1024 * 1024, // 100 MB
            strict_security: false,
            debug_routes: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            upload_dir: env::var("UPLOAD_DIR").unwrap_or(default.upload_dir),

            temp_dir: env::var("TEMP_DIR").unwrap_or(default.temp_dir),

            cache_dir: env::var("CACHE_DIR").unwrap_or(default.cache_dir),

            file_max_age_minutes: env::var("FILE_MAX_AGE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.file_max_age_minutes),

            max_stored_files: env::var("MAX_STORED_FILES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_stored_files),

            cleanup_interval_minutes: env::var("CLEANUP_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.cleanup_interval_minutes),

            delete_after_analysis_secs: env::var("DELETE_AFTER_ANALYSIS_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.delete_after_analysis_secs),

            cache_max_age_hours: env::var("CACHE_MAX_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.cache_max_age_hours),

            cache_max_size: env::var("CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.cache_max_size),

            strict_security: env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(default.strict_security),

            debug_routes: env::var("DEBUG_ROUTES")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.debug_routes),
        }
    }

    /// Create config for development (relaxed security, debug routes on)
    pub fn development() -> Self {
        Self {
            strict_security: false,
            debug_routes: true,
            ..Self::default()
        }
    }

    /// Create config for production (strict security, debug routes off)
    pub fn production() -> Self {
        Self {
            strict_security: true,
            debug_routes: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.file_max_age_minutes, 30);
        assert_eq!(config.max_stored_files, 100);
        assert!(!config.strict_security);
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert!(!config.strict_security);
        assert!(config.debug_routes);
    }

    #[test]
    fn test_production_config() {
        let config = AppConfig::production();
        assert!(config.strict_security);
        assert!(!config.debug_routes);
    }
}
