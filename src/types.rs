//! Core enumerations shared across the engine
//!
//! # Main Types
//!
//! - [`Category`] - The fixed kind of telemetry a point represents
//! - [`Namespace`] - The configuration origin a script was loaded from
//!
//! Both are closed sets. Categories map to canonical write paths
//! (`/v1/write/<category>`) and to script sub-directory names; namespaces carry
//! a strict override priority used by the script store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents the kind of telemetry carried by a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Time-series metrics
    Metric,
    /// Network flow records
    Network,
    /// Key events
    #[serde(rename = "keyevent")]
    KeyEvent,
    /// Object snapshots
    Object,
    /// User-defined object snapshots
    CustomObject,
    /// Log lines
    #[default]
    Logging,
    /// Trace spans
    Tracing,
    /// Real-user monitoring events
    #[serde(rename = "rum")]
    RUM,
    /// Security check results
    Security,
    /// Profiling samples
    Profiling,
    /// Dial-testing results
    #[serde(rename = "dialtesting")]
    DialTesting,
    /// Legacy metric category, resolved to [`Category::Metric`]
    #[serde(rename = "metrics")]
    MetricDeprecated,
    /// Unknown category, no script support
    UnknownCategory,
    /// Dynamic category, no script support
    #[serde(rename = "dynamic_dw")]
    DynamicDWCategory,
}

impl Category {
    /// Categories that own a script store, in a stable order
    pub const SCRIPTABLE: [Category; 11] = [
        Category::Metric,
        Category::Network,
        Category::KeyEvent,
        Category::Object,
        Category::CustomObject,
        Category::Logging,
        Category::Tracing,
        Category::RUM,
        Category::Security,
        Category::Profiling,
        Category::DialTesting,
    ];

    /// Resolve aliases to the category that actually owns the store
    pub fn resolve(self) -> Category {
        match self {
            Category::MetricDeprecated => Category::Metric,
            other => other,
        }
    }

    /// Whether scripts can be compiled against this category
    pub fn is_scriptable(self) -> bool {
        !matches!(
            self,
            Category::UnknownCategory | Category::DynamicDWCategory
        )
    }

    /// Short name used in logs, config files and stats
    pub fn name(self) -> &'static str {
        match self {
            Category::Metric => "metric",
            Category::Network => "network",
            Category::KeyEvent => "keyevent",
            Category::Object => "object",
            Category::CustomObject => "custom_object",
            Category::Logging => "logging",
            Category::Tracing => "tracing",
            Category::RUM => "rum",
            Category::Security => "security",
            Category::Profiling => "profiling",
            Category::DialTesting => "dialtesting",
            Category::MetricDeprecated => "metrics",
            Category::UnknownCategory => "unknown_category",
            Category::DynamicDWCategory => "dynamic_dw",
        }
    }

    /// Canonical write path, e.g. `/v1/write/logging`
    pub fn url_path(self) -> String {
        format!("/v1/write/{}", self.name())
    }

    /// Sub-directory holding scripts for this category.
    ///
    /// Logging scripts additionally live at the root of a script directory.
    pub fn dir_name(self) -> &'static str {
        self.resolve().name()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts the short name or the full write path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches("/v1/write/");
        let cat = match name.to_ascii_lowercase().as_str() {
            "metric" => Category::Metric,
            "metrics" => Category::MetricDeprecated,
            "network" => Category::Network,
            "keyevent" => Category::KeyEvent,
            "object" => Category::Object,
            "custom_object" => Category::CustomObject,
            "logging" => Category::Logging,
            "tracing" => Category::Tracing,
            "rum" => Category::RUM,
            "security" => Category::Security,
            "profiling" => Category::Profiling,
            "dialtesting" => Category::DialTesting,
            "dynamic_dw" => Category::DynamicDWCategory,
            "unknown_category" => Category::UnknownCategory,
            _ => return Err(format!("unknown category: {}", s)),
        };
        Ok(cat)
    }
}

/// Configuration origin of a script, lowest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Scripts shipped with the agent
    Default,
    /// Scripts managed in a git repository
    GitRepo,
    /// Scripts pushed through a configuration center
    Confd,
    /// Scripts pulled from the remote management plane
    Remote,
}

impl Namespace {
    /// All namespaces in ascending priority
    pub const ALL: [Namespace; 4] = [
        Namespace::Default,
        Namespace::GitRepo,
        Namespace::Confd,
        Namespace::Remote,
    ];

    /// Override priority; higher wins
    pub fn priority(self) -> u8 {
        match self {
            Namespace::Default => 0,
            Namespace::GitRepo => 1,
            Namespace::Confd => 2,
            Namespace::Remote => 3,
        }
    }

    /// Namespaces strictly below `self`, highest priority first
    pub fn fallbacks(self) -> impl Iterator<Item = Namespace> {
        let prio = self.priority();
        Namespace::ALL
            .into_iter()
            .rev()
            .filter(move |ns| ns.priority() < prio)
    }

    pub fn name(self) -> &'static str {
        match self {
            Namespace::Default => "default",
            Namespace::GitRepo => "gitrepo",
            Namespace::Confd => "confd",
            Namespace::Remote => "remote",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Namespace::Default),
            "gitrepo" => Ok(Namespace::GitRepo),
            "confd" => Ok(Namespace::Confd),
            "remote" => Ok(Namespace::Remote),
            _ => Err(format!("unknown script namespace: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_alias() {
        assert_eq!(Category::MetricDeprecated.resolve(), Category::Metric);
        assert_eq!(Category::Logging.resolve(), Category::Logging);
    }

    #[test]
    fn test_category_scriptable() {
        assert!(Category::Logging.is_scriptable());
        assert!(Category::MetricDeprecated.is_scriptable());
        assert!(!Category::UnknownCategory.is_scriptable());
        assert!(!Category::DynamicDWCategory.is_scriptable());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("logging".parse::<Category>(), Ok(Category::Logging));
        assert_eq!("/v1/write/rum".parse::<Category>(), Ok(Category::RUM));
        assert_eq!("metrics".parse::<Category>(), Ok(Category::MetricDeprecated));
        assert!("nope".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&Category::CustomObject).unwrap();
        assert_eq!(json, "\"custom_object\"");
        let cat: Category = serde_json::from_str("\"rum\"").unwrap();
        assert_eq!(cat, Category::RUM);
    }

    #[test]
    fn test_namespace_priority_order() {
        let prios: Vec<u8> = Namespace::ALL.iter().map(|ns| ns.priority()).collect();
        assert_eq!(prios, vec![0, 1, 2, 3]);
        assert!(Namespace::Remote > Namespace::Confd);
    }

    #[test]
    fn test_namespace_fallbacks() {
        let below: Vec<_> = Namespace::Remote.fallbacks().collect();
        assert_eq!(
            below,
            vec![Namespace::Confd, Namespace::GitRepo, Namespace::Default]
        );
        assert_eq!(Namespace::Default.fallbacks().count(), 0);
    }
}
