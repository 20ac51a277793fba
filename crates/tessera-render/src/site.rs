//! Tenant site configuration.
//!
//! One process serves many sites, one per host domain. The site file lists
//! each tenant with its root directory and template tree:
//!
//! ```yaml
//! engine:
//!   max_depth: 32
//! sites:
//!   - host: example.com
//!     root: sites/example.com
//!     aliases: [www.example.com]
//!   - host: blog.example.org
//!     root: /srv/blog
//!     templates: views
//! ```
//!
//! Relative roots resolve against the directory holding the file.

use crate::loader::{read_below, TemplateLoader};
use crate::options::EngineOptions;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tessera_core::{ConfigError, LoadError};
use tracing::{debug, warn};

/// Top-level site file structure
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub engine: EngineOptions,
}

/// One tenant
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub host: String,
    pub root: PathBuf,
    /// Template directory, relative to `root`
    #[serde(default = "default_templates")]
    pub templates: PathBuf,
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_templates() -> PathBuf {
    PathBuf::from("templates")
}

impl SiteConfig {
    /// Load and validate a site file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for site in &mut config.sites {
            if site.root.is_relative() {
                site.root = base.join(&site.root);
            }
        }
        Ok(config)
    }

    /// Parse and validate site YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::Parse(format!("failed to parse site YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Hosts must be non-empty and unique across names and aliases
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.max_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine.render_budget == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.render_budget".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, site) in self.sites.iter().enumerate() {
            if site.host.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: format!("sites[{}].host", index),
                    reason: "host must not be empty".to_string(),
                });
            }
            for name in std::iter::once(&site.host).chain(&site.aliases) {
                let host = normalize_host(name);
                if let Some(previous) = seen.insert(host.clone(), index) {
                    return Err(ConfigError::Invalid {
                        field: format!("sites[{}].host", index),
                        reason: format!("'{}' is already used by sites[{}]", host, previous),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A resolved tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub host: String,
    pub root: PathBuf,
    pub template_dir: PathBuf,
}

/// Host → site lookup; also the filesystem template loader
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<Site>,
    hosts: HashMap<String, usize>,
}

impl SiteRegistry {
    pub fn from_config(config: &SiteConfig) -> Self {
        let mut registry = Self::default();
        for entry in &config.sites {
            let index = registry.sites.len();
            registry.sites.push(Site {
                host: normalize_host(&entry.host),
                root: entry.root.clone(),
                template_dir: entry.root.join(&entry.templates),
            });
            for name in std::iter::once(&entry.host).chain(&entry.aliases) {
                registry.hosts.insert(normalize_host(name), index);
            }
        }
        debug!(sites = registry.sites.len(), "site registry built");
        registry
    }

    /// Site serving `host` (case-insensitive, port ignored)
    pub fn resolve(&self, host: &str) -> Option<&Site> {
        let site = self
            .hosts
            .get(&normalize_host(host))
            .and_then(|&index| self.sites.get(index));
        if site.is_none() {
            warn!(host, "no site configured for host");
        }
        site
    }

    /// Tenant root directory for `host`
    pub fn site_root(&self, host: &str) -> Option<PathBuf> {
        self.resolve(host).map(|site| site.root.clone())
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }
}

impl TemplateLoader for SiteRegistry {
    fn load(&self, name: &str, host: &str) -> Result<String, LoadError> {
        let site = self
            .resolve(host)
            .ok_or_else(|| LoadError::UnknownHost(host.to_string()))?;
        read_below(&site.template_dir, name)
    }
}

/// Lower-case, drop any port and trailing dot
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    let without_port = match host.rfind(':') {
        Some(at) if !host.starts_with('[') || host[..at].ends_with(']') => &host[..at],
        _ => host.as_str(),
    };
    without_port.trim_end_matches('.').to_string()
}
