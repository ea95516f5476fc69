//! descriptors for every plugin the engine knows how to instantiate
//!
//! Scanning the disk for plugins happens elsewhere. The scanner reports each
//! find through [`PluginCatalog::on_plugin_found`], or a saved list of paths is
//! handed to [`PluginCatalog::initialize_plugins_list`] at startup.
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub group: String,
    pub path: String,
}

impl PluginDescriptor {
    pub fn new(name: &str, group: &str, path: &str) -> PluginDescriptor {
        PluginDescriptor {
            name: name.to_string(),
            group: group.to_string(),
            path: path.to_string(),
        }
    }
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}] {}", self.name, self.group, self.path)
    }
}

#[derive(Debug, Default)]
pub struct PluginCatalog {
    descriptors: Vec<PluginDescriptor>,
}

impl PluginCatalog {
    pub fn new() -> PluginCatalog {
        PluginCatalog { descriptors: vec![] }
    }
    /// record a discovered plugin; a path already known is ignored
    pub fn on_plugin_found(&mut self, name: &str, group: &str, path: &str) -> bool {
        if self.descriptors.iter().any(|d| d.path == path) {
            debug!("plugin already listed: {}", path);
            return false;
        }
        self.descriptors.push(PluginDescriptor::new(name, group, path));
        true
    }
    /// rebuild the list from stored plugin file paths, named after the file stem
    pub fn initialize_plugins_list(&mut self, paths: &[String]) -> usize {
        self.descriptors.clear();
        for path in paths {
            match Path::new(path).file_stem().and_then(|s| s.to_str()) {
                Some(name) if !name.is_empty() => {
                    self.on_plugin_found(name, "VST", path);
                }
                _ => {
                    warn!("skipping plugin path without a name: '{}'", path);
                }
            }
        }
        self.descriptors.len()
    }
    pub fn add_descriptors(&mut self, descriptors: Vec<PluginDescriptor>) -> () {
        for d in descriptors {
            self.on_plugin_found(&d.name, &d.group, &d.path);
        }
    }
    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }
    pub fn find_by_name(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.descriptors).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod test_catalog {
    use super::*;

    #[test]
    fn names_come_from_file_stem() {
        let mut catalog = PluginCatalog::new();
        let paths = vec![
            "/usr/lib/vst/Reverb.so".to_string(),
            "C:\\plugins\\Delay.dll".to_string(),
            "".to_string(),
        ];
        let count = catalog.initialize_plugins_list(&paths);
        assert_eq!(count, 2);
        assert_eq!(catalog.descriptors()[0].name, "Reverb");
        assert_eq!(catalog.descriptors()[0].group, "VST");
        assert!(catalog.find_by_name("Reverb").is_some());
    }

    #[test]
    fn duplicate_paths_ignored() {
        let mut catalog = PluginCatalog::new();
        assert!(catalog.on_plugin_found("Comp", "VST", "/a/Comp.so"));
        assert!(!catalog.on_plugin_found("Comp", "VST", "/a/Comp.so"));
        assert_eq!(catalog.descriptors().len(), 1);
        assert_eq!(catalog.as_json()[0]["path"], "/a/Comp.so");
    }
}
