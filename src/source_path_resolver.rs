//! C3: bidirectional URL↔absolute-path translation driven by configuration
//! (`web_root`, `path_mapping`). No direct teacher analogue — boa resolves
//! scripts by engine-internal id, not by path remapping — built from the
//! `url` crate's parsing idioms already in the teacher's dependency table.

use url::Url;

use crate::config::{LaunchConfig, PathMappingRule};

#[derive(Debug, Clone, Default)]
pub struct SourcePathResolver {
    web_root: Option<String>,
    path_mapping: Vec<PathMappingRule>,
}

impl SourcePathResolver {
    pub fn from_config(config: &LaunchConfig) -> Self {
        Self {
            web_root: config.web_root.clone(),
            path_mapping: config.path_mapping.clone(),
        }
    }

    /// `file://` scheme URLs are stripped directly; otherwise prefix rules
    /// are tried in order, falling back to rebasing the pathname under
    /// `web_root`. Results are not filesystem-checked; callers decide.
    pub fn url_to_absolute_path(&self, url: &str) -> Option<String> {
        if let Some(path) = url.strip_prefix("file://") {
            return Some(path.to_string());
        }

        for rule in &self.path_mapping {
            if let Some(rest) = url.strip_prefix(rule.url_prefix.as_str()) {
                return Some(join_path(&rule.path_prefix, rest));
            }
        }

        let web_root = self.web_root.as_ref()?;
        let parsed = Url::parse(url).ok()?;
        let mut pathname = parsed.path().to_string();
        if pathname.is_empty() || pathname == "/" {
            pathname = "/index.html".to_string();
        }
        Some(join_path(web_root, pathname.trim_start_matches('/')))
    }

    /// Inverts [`Self::url_to_absolute_path`]: finds a rule (or `web_root`)
    /// whose path side prefixes `absolute_path` and rewrites it to a URL.
    pub fn absolute_path_to_url(&self, absolute_path: &str) -> Option<String> {
        for rule in &self.path_mapping {
            if let Some(rest) = absolute_path.strip_prefix(rule.path_prefix.as_str()) {
                return Some(join_path(&rule.url_prefix, rest.trim_start_matches('/')));
            }
        }

        let web_root = self.web_root.as_ref()?;
        let rest = absolute_path.strip_prefix(web_root.as_str())?;
        let rest = rest.trim_start_matches('/');
        if rest == "index.html" {
            Some("/".to_string())
        } else {
            Some(format!("/{rest}"))
        }
    }
}

fn join_path(prefix: &str, rest: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{}", rest.trim_start_matches('/'))
    } else {
        format!("{prefix}/{}", rest.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SourcePathResolver {
        SourcePathResolver {
            web_root: Some("/w".into()),
            path_mapping: vec![PathMappingRule {
                url_prefix: "https://cdn.example.com/".into(),
                path_prefix: "/w/vendor".into(),
            }],
        }
    }

    #[test]
    fn file_scheme_is_stripped_directly() {
        let r = SourcePathResolver::default();
        assert_eq!(
            r.url_to_absolute_path("file:///w/a.js").as_deref(),
            Some("/w/a.js")
        );
    }

    #[test]
    fn path_mapping_rule_takes_precedence_over_web_root() {
        let r = resolver();
        assert_eq!(
            r.url_to_absolute_path("https://cdn.example.com/lib.js")
                .as_deref(),
            Some("/w/vendor/lib.js")
        );
    }

    #[test]
    fn root_pathname_rebases_to_index_html() {
        let r = resolver();
        assert_eq!(
            r.url_to_absolute_path("http://localhost:8080/").as_deref(),
            Some("/w/index.html")
        );
    }

    #[test]
    fn absolute_path_to_url_inverts_web_root_rebasing() {
        let r = resolver();
        assert_eq!(
            r.absolute_path_to_url("/w/a.js").as_deref(),
            Some("/a.js")
        );
        assert_eq!(r.absolute_path_to_url("/w/index.html").as_deref(), Some("/"));
    }
}
