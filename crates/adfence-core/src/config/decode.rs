//! Lenient field-by-field decoding of TOML tables.
//!
//! A strict `toml::from_str` rejects the whole file when one value has the
//! wrong type. These helpers decode each key on its own so a single bad
//! value only costs that value (plus a warning), not the whole file.

use serde::de::DeserializeOwned;
use toml::{Table, Value};

use super::rules::RuleSet;
use super::{Settings, TimingConfig};
use crate::logging::LogConfig;

/// Reads `key` as `T`, keeping `default` when it is missing or invalid.
pub(super) fn field<T: DeserializeOwned>(
    table: &Table,
    key: &str,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    let Some(value) = table.get(key) else {
        return default;
    };
    match value.clone().try_into::<T>() {
        Ok(v) => v,
        Err(e) => {
            warnings.push(format!("{key}: invalid value ({e}); using the default"));
            default
        }
    }
}

/// Reads `key` as a list of non-empty strings.
///
/// Returns `None` when the key is missing or is not an array. Non-string
/// and empty entries are dropped with a warning.
pub(super) fn string_list(table: &Table, key: &str, warnings: &mut Vec<String>) -> Option<Vec<String>> {
    let value = table.get(key)?;
    let Value::Array(items) = value else {
        warnings.push(format!(
            "{key}: expected a list of strings, found {}; using the fallback",
            value.type_str()
        ));
        return None;
    };
    let mut out = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match item {
            Value::String(s) if !s.is_empty() => out.push(s.clone()),
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        warnings.push(format!("{key}: dropped {dropped} empty or non-string entries"));
    }
    Some(out)
}

/// Returns the nested table at `key`, warning when it has the wrong type.
pub(super) fn section<'a>(table: &'a Table, key: &str, warnings: &mut Vec<String>) -> Option<&'a Table> {
    match table.get(key)? {
        Value::Table(t) => Some(t),
        other => {
            warnings.push(format!("[{key}]: expected a table, found {}; using defaults", other.type_str()));
            None
        }
    }
}

pub(super) fn decode_settings(table: &Table, warnings: &mut Vec<String>) -> Settings {
    let d = Settings::default();
    let timing = match section(table, "timing", warnings) {
        Some(t) => decode_timing(t, warnings),
        None => d.timing.clone(),
    };
    let logging = match section(table, "logging", warnings) {
        Some(t) => decode_logging(t, warnings),
        None => d.logging.clone(),
    };
    Settings {
        enabled: field(table, "enabled", d.enabled, warnings),
        aggressive_mode: field(table, "aggressive_mode", d.aggressive_mode, warnings),
        target_process: field(table, "target_process", d.target_process, warnings),
        timing,
        logging,
    }
}

fn decode_timing(table: &Table, warnings: &mut Vec<String>) -> TimingConfig {
    let d = TimingConfig::default();
    TimingConfig {
        active_interval_ms: field(table, "active_interval_ms", d.active_interval_ms, warnings),
        idle_interval_ms: field(table, "idle_interval_ms", d.idle_interval_ms, warnings),
        pid_scan_interval_ms: field(table, "pid_scan_interval_ms", d.pid_scan_interval_ms, warnings),
        cache_sweep_interval_ms: field(
            table,
            "cache_sweep_interval_ms",
            d.cache_sweep_interval_ms,
            warnings,
        ),
        stop_timeout_ms: field(table, "stop_timeout_ms", d.stop_timeout_ms, warnings),
    }
}

fn decode_logging(table: &Table, warnings: &mut Vec<String>) -> LogConfig {
    let d = LogConfig::default();
    LogConfig {
        enabled: field(table, "enabled", d.enabled, warnings),
        level: field(table, "level", d.level, warnings),
        max_file_mb: field(table, "max_file_mb", d.max_file_mb, warnings),
    }
}

pub(super) fn decode_rules(table: &Table, warnings: &mut Vec<String>) -> RuleSet {
    let d = RuleSet::default();
    let main_window_classes =
        string_list(table, "main_window_classes", warnings).unwrap_or(d.main_window_classes);
    // Absent or invalid: fall back to whatever the main classes are.
    let ad_candidate_classes = string_list(table, "ad_candidate_classes", warnings)
        .unwrap_or_else(|| main_window_classes.clone());
    RuleSet {
        main_window_classes,
        ad_candidate_classes,
        main_window_titles: string_list(table, "main_window_titles", warnings)
            .unwrap_or(d.main_window_titles),
        chrome_legacy_title: field(table, "chrome_legacy_title", d.chrome_legacy_title, warnings),
        chrome_legacy_title_contains: string_list(table, "chrome_legacy_title_contains", warnings)
            .unwrap_or(d.chrome_legacy_title_contains),
        aggressive_ad_tokens: string_list(table, "aggressive_ad_tokens", warnings)
            .unwrap_or(d.aggressive_ad_tokens),
        banner_min_height_px: field(table, "banner_min_height_px", d.banner_min_height_px, warnings),
        banner_max_height_px: field(table, "banner_max_height_px", d.banner_max_height_px, warnings),
        banner_min_width_ratio: field(
            table,
            "banner_min_width_ratio",
            d.banner_min_width_ratio,
            warnings,
        ),
        banner_bottom_margin_px: field(
            table,
            "banner_bottom_margin_px",
            d.banner_bottom_margin_px,
            warnings,
        ),
        layout_shadow_padding_px: field(
            table,
            "layout_shadow_padding_px",
            d.layout_shadow_padding_px,
            warnings,
        ),
        main_view_padding_px: field(table, "main_view_padding_px", d.main_view_padding_px, warnings),
        content_child_class: field(table, "content_child_class", d.content_child_class, warnings),
        main_view_prefix: field(table, "main_view_prefix", d.main_view_prefix, warnings),
        lock_view_prefix: field(table, "lock_view_prefix", d.lock_view_prefix, warnings),
        custom_scroll_prefix: field(table, "custom_scroll_prefix", d.custom_scroll_prefix, warnings),
        chrome_widget_prefixes: string_list(table, "chrome_widget_prefixes", warnings)
            .unwrap_or(d.chrome_widget_prefixes),
        cache_ttl_ms: field(table, "cache_ttl_ms", d.cache_ttl_ms, warnings),
        empty_text_ttl_ms: field(table, "empty_text_ttl_ms", d.empty_text_ttl_ms, warnings),
        signature_search_depth: field(
            table,
            "signature_search_depth",
            d.signature_search_depth,
            warnings,
        ),
        log_rate_limit_ms: field(table, "log_rate_limit_ms", d.log_rate_limit_ms, warnings),
    }
}
