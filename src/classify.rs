//! Maps changed paths to reload categories.
//!
//! Each category owns a set of glob patterns of the shape
//! `**/<category-dir>/*.<ext>`: any provisioning file directly inside a
//! directory named after the category, at any depth. Patterns are evaluated
//! independently, so a single path can match more than one category.

use std::fmt;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

/// File extensions treated as provisioning configuration.
const PROVISIONING_EXTENSIONS: [&str; 3] = ["yml", "yaml", "json"];

/// A class of provisioned configuration with its own reload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadCategory {
    Dashboards,
    Datasources,
}

impl ReloadCategory {
    pub const ALL: [ReloadCategory; 2] = [ReloadCategory::Dashboards, ReloadCategory::Datasources];

    /// Directory name whose contents belong to this category.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ReloadCategory::Dashboards => "dashboards",
            ReloadCategory::Datasources => "datasources",
        }
    }

    /// Admin API path that reloads this category's provisioning.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            ReloadCategory::Dashboards => "api/admin/provisioning/dashboards/reload",
            ReloadCategory::Datasources => "api/admin/provisioning/datasources/reload",
        }
    }
}

impl fmt::Display for ReloadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Kind of filesystem change, as reported by the watch capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Classifies changed paths into reload categories.
///
/// Pure and stateless after construction; an empty result means
/// "not a provisioning file, ignore" rather than an error.
pub struct ChangeClassifier {
    rules: Vec<(ReloadCategory, Vec<Pattern>)>,
}

impl ChangeClassifier {
    pub fn new() -> Self {
        let rules = ReloadCategory::ALL
            .iter()
            .map(|&category| {
                let patterns = PROVISIONING_EXTENSIONS
                    .iter()
                    .map(|ext| {
                        let glob = format!("**/{}/*.{}", category.dir_name(), ext);
                        Pattern::new(&glob).expect("category glob is valid")
                    })
                    .collect();
                (category, patterns)
            })
            .collect();

        Self { rules }
    }

    /// Return every category whose pattern matches the path.
    pub fn classify(&self, path: &Path) -> Vec<ReloadCategory> {
        // `*` must not span separators, or files nested below the category
        // directory would match too.
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };

        self.rules
            .iter()
            .filter(|(_, patterns)| {
                patterns.iter().any(|p| p.matches_path_with(path, options))
            })
            .map(|(category, _)| *category)
            .collect()
    }
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn classify(path: &str) -> Vec<ReloadCategory> {
        ChangeClassifier::new().classify(&PathBuf::from(path))
    }

    #[test]
    fn dashboard_yaml_matches_dashboards() {
        assert_eq!(
            classify("/etc/grafana/provisioning/dashboards/home.yml"),
            vec![ReloadCategory::Dashboards]
        );
    }

    #[test]
    fn datasource_yaml_matches_datasources() {
        assert_eq!(
            classify("/etc/grafana/provisioning/datasources/prometheus.yml"),
            vec![ReloadCategory::Datasources]
        );
    }

    #[test]
    fn extension_mismatch_is_unmatched() {
        assert!(classify("/etc/grafana/provisioning/dashboards/readme.txt").is_empty());
    }

    #[test]
    fn match_is_depth_agnostic() {
        assert_eq!(
            classify("/srv/other/dashboards/home.yml"),
            vec![ReloadCategory::Dashboards]
        );
    }

    #[test]
    fn nested_file_under_category_dir_does_not_match() {
        // Only files directly inside the category directory count.
        assert!(classify("/etc/provisioning/dashboards/archive/old.yml").is_empty());
        assert!(classify("/p/datasources/team-a/deep/prom.yaml").is_empty());
    }

    #[test]
    fn json_and_yaml_variants_match() {
        assert_eq!(
            classify("/p/datasources/loki.yaml"),
            vec![ReloadCategory::Datasources]
        );
        assert_eq!(
            classify("/p/dashboards/ops.json"),
            vec![ReloadCategory::Dashboards]
        );
    }

    #[test]
    fn unrelated_path_is_unmatched() {
        assert!(classify("/var/log/syslog").is_empty());
    }
}
