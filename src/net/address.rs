use dashmap::DashMap;
use std::collections::BTreeMap;

/// Default peer URL template: every server is reachable by its name on the
/// cluster network.
pub const DEFAULT_PEER_TEMPLATE: &str = "http://{name}:5000";

/// Server name → base URL.
///
/// Names registered explicitly (e.g. processes the shard manager spawned on
/// local ports) win; every other name is resolved through the template.
#[derive(Debug)]
pub struct AddressBook {
    template: String,
    known: DashMap<String, String>,
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::new(DEFAULT_PEER_TEMPLATE)
    }
}

impl AddressBook {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.trim_end_matches('/').to_string(),
            known: DashMap::new(),
        }
    }

    pub fn register(&self, name: &str, url: &str) {
        self.known
            .insert(name.to_string(), url.trim_end_matches('/').to_string());
    }

    pub fn forget(&self, name: &str) {
        self.known.remove(name);
    }

    pub fn merge(&self, addresses: &BTreeMap<String, String>) {
        for (name, url) in addresses {
            self.register(name, url);
        }
    }

    pub fn resolve(&self, name: &str) -> String {
        match self.known.get(name) {
            Some(url) => url.clone(),
            None => self.template.replace("{name}", name),
        }
    }

    /// Full URL of `path` on server `name`.
    pub fn url(&self, name: &str, path: &str) -> String {
        format!("{}{}", self.resolve(name), path)
    }

    /// Explicitly registered addresses.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.known
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
