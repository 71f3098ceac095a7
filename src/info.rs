use std::sync::OnceLock;

use serde::Serialize;

/// Build and platform description handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub app_name: &'static str,
    pub app_revision: &'static str,
    pub app_version: &'static str,
    pub system_name: &'static str,
}

static INFO: OnceLock<RuntimeInfo> = OnceLock::new();

/// Computed on first use; every later call returns the same instance.
pub fn runtime_info() -> &'static RuntimeInfo {
    INFO.get_or_init(|| RuntimeInfo {
        app_name: env!("CARGO_PKG_NAME"),
        app_revision: option_env!("APP_REV").unwrap_or("unknown"),
        app_version: env!("CARGO_PKG_VERSION"),
        system_name: system_name(),
    })
}

fn system_name() -> &'static str {
    if cfg!(target_os = "android") {
        "android"
    } else if cfg!(target_os = "ios") {
        "iOS"
    } else if cfg!(target_os = "macos") {
        "macOS"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}
