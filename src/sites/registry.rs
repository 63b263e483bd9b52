//! Site registry: built-in descriptors plus configured ones.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{SiteDescriptor, SiteError};
use crate::config::Config;

const BUILTIN_SITES: &str = include_str!("builtin.toml");

#[derive(Deserialize)]
struct SiteTable {
    #[serde(default)]
    sites: BTreeMap<String, SiteDescriptor>,
}

/// Known sites keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteDescriptor>,
}

impl SiteRegistry {
    /// Registry holding only the built-in descriptors.
    pub fn builtin() -> Result<Self, SiteError> {
        let table: SiteTable =
            toml::from_str(BUILTIN_SITES).map_err(|e| SiteError::Builtin(e.to_string()))?;
        let mut registry = Self::default();
        for (id, site) in table.sites {
            registry.insert(id, site);
        }
        Ok(registry)
    }

    /// Built-in descriptors with the config file's `[sites]` added on top.
    /// A configured site with a built-in id replaces the built-in one.
    pub fn with_config(config: &Config) -> Result<Self, SiteError> {
        let mut registry = Self::builtin()?;
        for (id, site) in &config.sites {
            if registry.sites.contains_key(id) {
                tracing::debug!("Config replaces built-in site '{}'", id);
            }
            registry.insert(id.clone(), site.clone());
        }
        Ok(registry)
    }

    pub fn insert(&mut self, id: String, mut site: SiteDescriptor) {
        site.id = id.clone();
        self.sites.insert(id, site);
    }

    pub fn get(&self, id: &str) -> Result<&SiteDescriptor, SiteError> {
        self.sites.get(id).ok_or_else(|| SiteError::Unknown {
            id: id.to_string(),
            available: self.ids().join(", "),
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sites.keys().map(|k| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteDescriptor> {
        self.sites.values()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::{Engine, Pagination};

    #[test]
    fn test_builtin_sites_parse_and_validate() {
        let registry = SiteRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 8);
        for site in registry.iter() {
            site.validate()
                .unwrap_or_else(|e| panic!("{} failed validation: {}", site.id, e));
        }
    }

    #[test]
    fn test_builtin_strategies() {
        let registry = SiteRegistry::builtin().unwrap();
        assert_eq!(
            registry.get("intersec").unwrap().pagination.strategy(),
            "next-button"
        );
        assert_eq!(
            registry.get("airportshow").unwrap().pagination,
            Pagination::InfiniteScroll {
                stability_threshold: 15,
                max_items: None,
                max_scrolls: None,
                container: None,
            }
        );
        let ism = registry.get("ism").unwrap();
        assert_eq!(ism.engine, Engine::Http);
        assert_eq!(ism.pagination.strategy(), "query-param");
        assert_eq!(
            registry.get("intersec-ksa").unwrap().output.checkpoint_interval,
            Some(50)
        );
    }

    #[test]
    fn test_unknown_site_lists_available() {
        let registry = SiteRegistry::builtin().unwrap();
        match registry.get("nope") {
            Err(SiteError::Unknown { available, .. }) => assert!(available.contains("gitex")),
            other => panic!("expected unknown site, got {:?}", other.map(|s| &s.id)),
        }
    }

    #[test]
    fn test_config_replaces_builtin() {
        let mut config = Config::default();
        let mut site = SiteRegistry::builtin()
            .unwrap()
            .get("sleepexpo")
            .unwrap()
            .clone();
        site.name = "Sleep Expo (local mirror)".to_string();
        config.sites.insert("sleepexpo".to_string(), site);

        let registry = SiteRegistry::with_config(&config).unwrap();
        assert_eq!(registry.len(), 8);
        let site = registry.get("sleepexpo").unwrap();
        assert_eq!(site.name, "Sleep Expo (local mirror)");
        assert_eq!(site.id, "sleepexpo");
    }
}
