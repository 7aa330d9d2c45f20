use std::path::PathBuf;

use directories::ProjectDirs;

/// Endpoints probed to classify network reachability (§4.1 deep tier).
pub const DEFAULT_PROBE_HOSTS: &[&str] = &["https://pypi.org", "https://registry.npmjs.org", "https://github.com"];

pub struct AppContext {
    pub state_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub http: reqwest::Client,
    pub probe_hosts: Vec<String>,
}

impl AppContext {
    pub fn new(state_dir: Option<PathBuf>, catalog_dir: Option<PathBuf>) -> Self {
        let dirs = ProjectDirs::from("", "", "toolrig");
        let state_dir = state_dir.unwrap_or_else(|| {
            dirs.as_ref().map(|d| d.data_dir().join("state")).unwrap_or_else(|| PathBuf::from("./toolrig-state"))
        });
        let catalog_dir = catalog_dir.unwrap_or_else(|| {
            dirs.as_ref().map(|d| d.config_dir().join("recipes")).unwrap_or_else(|| PathBuf::from("./toolrig-recipes"))
        });
        Self {
            state_dir,
            catalog_dir,
            http: reqwest::Client::new(),
            probe_hosts: DEFAULT_PROBE_HOSTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
