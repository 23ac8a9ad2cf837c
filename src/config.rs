//! Launch-time configuration, recognised per the configuration table.
//!
//! Grounded on the teacher's `LaunchRequestArguments` (flat,
//! serde-deserializable struct consumed directly from the `launch` request
//! body).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Navigate the target to this URL after launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Root for URL→path resolution and source-map rebasing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_root: Option<String>,

    /// Additional URL-prefix → path-prefix rules, consulted before
    /// `web_root`.
    #[serde(default)]
    pub path_mapping: Vec<PathMappingRule>,

    /// Glob patterns marking sources blackboxed at load.
    #[serde(default)]
    pub skip_files: Vec<String>,

    /// Enables the `SmartStepper`.
    #[serde(default)]
    pub smart_step: bool,

    /// Enables rename-provider lookups in variables and hovers.
    #[serde(default)]
    pub source_map_renames: bool,

    /// JS function source rendering an object to a description string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_description_generator: Option<String>,

    /// JS function source returning a replacement object for a variable's
    /// children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_properties_generator: Option<String>,

    /// Glob patterns fed to the `BreakpointPredictor`.
    #[serde(default)]
    pub out_files: Vec<String>,

    /// Directory for the predictor's persisted cache file.
    #[serde(rename = "__workspaceCachePath", skip_serializing_if = "Option::is_none")]
    pub workspace_cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMappingRule {
    pub url_prefix: String,
    pub path_prefix: String,
}

/// Identifies one workspace's predictor cache file on disk, keyed by
/// absolute compiled path, per the persisted-state layout.
pub type PredictorCacheMap = HashMap<String, PredictorCacheEntry>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorCacheEntry {
    /// The compiled file's mtime at the time this entry was written;
    /// entries are stale (and treated as absent) once the file's current
    /// mtime no longer matches.
    pub correlation: u64,
    pub value: Vec<super::breakpoint_predictor::DiscoveredMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_config_deserializes_from_camel_case_wire_shape() {
        let json = serde_json::json!({
            "url": "http://localhost:8080",
            "webRoot": "/w",
            "skipFiles": ["**/node_modules/**"],
            "smartStep": true,
            "outFiles": ["/w/out/**/*.js"],
            "__workspaceCachePath": "/w/.cache",
        });
        let config: LaunchConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.web_root.as_deref(), Some("/w"));
        assert!(config.smart_step);
        assert_eq!(config.out_files, vec!["/w/out/**/*.js".to_string()]);
        assert_eq!(config.workspace_cache_path.as_deref(), Some("/w/.cache"));
    }
}
