use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Longest allowed refresh interval: one week.
pub const MAX_REFRESH_INTERVAL_MINS: u64 = 7 * 24 * 60;

/// Validate configuration
/// Currently validates:
/// - Bounds are at least 1 (max_items, retries, refresh interval)
/// - Refresh interval is at most one week
/// - Source names and output filenames are unique
/// - No source writes over the aggregate feed
/// - Every source has an RSS URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.output.max_items == 0 {
        return invalid("output.max_items must be at least 1");
    }
    if config.fetch.max_retry == 0 {
        return invalid("fetch.max_retry must be at least 1");
    }
    if config.download.max_retry == 0 {
        return invalid("download.max_retry must be at least 1");
    }

    let mut names = HashSet::new();
    let mut filenames = HashSet::new();

    for source in &config.sources {
        if !names.insert(source.name.as_str()) {
            return invalid(format!("duplicate source name '{}'", source.name));
        }
        if source.rss_url.trim().is_empty() {
            return invalid(format!("source '{}' has an empty rss_url", source.name));
        }
        if source.refresh_interval_mins == 0 {
            return invalid(format!(
                "source '{}' refresh_interval_mins must be at least 1",
                source.name
            ));
        }
        if source.refresh_interval_mins > MAX_REFRESH_INTERVAL_MINS {
            return invalid(format!(
                "source '{}' refresh_interval_mins must be at most {}",
                source.name, MAX_REFRESH_INTERVAL_MINS
            ));
        }
        if source.output_filename == config.output.aggregate_filename {
            return invalid(format!(
                "source '{}' output_filename collides with the aggregate feed",
                source.name
            ));
        }
        if !filenames.insert(source.output_filename.as_str()) {
            return invalid(format!(
                "duplicate output_filename '{}'",
                source.output_filename
            ));
        }
    }

    Ok(())
}

fn invalid(msg: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(msg.into()))
}
