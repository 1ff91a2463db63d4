use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::Config;

/// A named aggregation bucket for related symbols.
#[derive(Debug)]
pub struct SymbolGroup {
    pub name: String,
    pub description: Option<String>,
    /// Cap on the summed positive score of member symbols; zero or negative
    /// means uncapped.
    pub max_score: f64,
}

impl SymbolGroup {
    pub fn new(name: &str, max_score: f64) -> Self {
        SymbolGroup {
            name: name.to_string(),
            description: None,
            max_score,
        }
    }

    pub fn is_capped(&self) -> bool {
        self.max_score > 0.0
    }
}

/// Static definition of a symbol as the rule registry knows it.
#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub description: Option<String>,
    // Static weight sits behind a lock so it can be re-loaded while scans
    // holding the definition are in flight.
    weight: RwLock<f64>,
    /// Maximum number of counted hits per message; zero or negative means
    /// unlimited.
    pub nshots: i32,
    /// Symbol keeps at most one option.
    pub one_param: bool,
    /// Group memberships, in configuration order.
    pub groups: Vec<Arc<SymbolGroup>>,
}

impl Symbol {
    pub fn new(name: &str, weight: f64, nshots: i32, groups: Vec<Arc<SymbolGroup>>) -> Self {
        Symbol {
            name: name.to_string(),
            description: None,
            weight: RwLock::new(weight),
            nshots,
            one_param: false,
            groups,
        }
    }

    pub fn one_param(mut self, one_param: bool) -> Self {
        self.one_param = one_param;
        self
    }

    /// Current static weight.
    pub fn weight(&self) -> f64 {
        *self.weight.read().unwrap()
    }

    pub fn set_weight(&self, weight: f64) {
        *self.weight.write().unwrap() = weight;
    }
}

/// Lookup table of symbol definitions and groups for one scan profile.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    symbols: HashMap<String, Arc<Symbol>>,
    groups: HashMap<String, Arc<SymbolGroup>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        SymbolRegistry::default()
    }

    /// Build the registry from a parsed configuration.
    ///
    /// Groups referenced by a symbol but missing from the group table are
    /// created uncapped with a warning, so a partial configuration still
    /// scans.
    pub fn from_config(cfg: &Config) -> Self {
        let mut registry = SymbolRegistry::new();

        for (name, gc) in &cfg.groups {
            let mut group = SymbolGroup::new(name, gc.max_score.unwrap_or(0.0));
            group.description = gc.description.clone();
            registry.groups.insert(name.clone(), Arc::new(group));
        }

        for (name, sc) in &cfg.symbols {
            let mut groups = Vec::with_capacity(sc.groups.len());
            for gname in &sc.groups {
                let group = registry.groups.entry(gname.clone()).or_insert_with(|| {
                    log::warn!(
                        "symbol {name} references undefined group {gname}, creating it uncapped"
                    );
                    Arc::new(SymbolGroup::new(gname, 0.0))
                });
                groups.push(group.clone());
            }

            let nshots = if sc.one_shot {
                1
            } else {
                sc.nshots.unwrap_or(cfg.default_max_shots as i32)
            };

            let mut symbol = Symbol::new(name, sc.weight, nshots, groups).one_param(sc.one_param);
            symbol.description = sc.description.clone();
            registry.symbols.insert(name.clone(), Arc::new(symbol));
        }

        registry
    }

    pub fn symbol(&self, name: &str) -> Option<&Arc<Symbol>> {
        self.symbols.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&Arc<SymbolGroup>> {
        self.groups.get(name)
    }

    /// Register a group, returning the shared handle.
    pub fn add_group(&mut self, name: &str, max_score: f64) -> Arc<SymbolGroup> {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SymbolGroup::new(name, max_score)))
            .clone()
    }

    /// Register a symbol definition, returning the shared handle.
    pub fn add_symbol(&mut self, symbol: Symbol) -> Arc<Symbol> {
        let handle = Arc::new(symbol);
        self.symbols.insert(handle.name.clone(), handle.clone());
        handle
    }

    /// Re-load the static weight of a symbol. Returns false when the symbol
    /// is unknown.
    pub fn set_weight(&self, name: &str, weight: f64) -> bool {
        match self.symbols.get(name) {
            Some(symbol) => {
                symbol.set_weight(weight);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GroupConfig, SymbolConfig};

    fn symbol_conf(weight: f64, groups: &[&str]) -> SymbolConfig {
        SymbolConfig {
            weight,
            description: None,
            groups: groups.iter().map(|g| g.to_string()).collect(),
            one_shot: false,
            one_param: false,
            nshots: None,
        }
    }

    #[test]
    fn test_registry_from_config() {
        let mut cfg = Config::default();
        cfg.groups.insert(
            "phishing".to_string(),
            GroupConfig {
                description: None,
                max_score: Some(10.0),
            },
        );
        cfg.symbols
            .insert("FAKE_SENDER".to_string(), symbol_conf(4.0, &["phishing"]));

        let registry = SymbolRegistry::from_config(&cfg);
        assert_eq!(registry.len(), 1);
        let sym = registry.symbol("FAKE_SENDER").expect("symbol registered");
        assert_eq!(sym.weight(), 4.0);
        assert_eq!(sym.nshots, cfg.default_max_shots as i32);
        assert_eq!(sym.groups.len(), 1);
        assert!(sym.groups[0].is_capped());
        assert_eq!(sym.groups[0].max_score, 10.0);
    }

    #[test]
    fn test_undefined_group_created_uncapped() {
        let mut cfg = Config::default();
        cfg.symbols
            .insert("ORPHAN".to_string(), symbol_conf(1.0, &["nowhere"]));

        let registry = SymbolRegistry::from_config(&cfg);
        let group = registry.group("nowhere").expect("group created");
        assert!(!group.is_capped());
    }

    #[test]
    fn test_one_shot_overrides_nshots() {
        let mut cfg = Config::default();
        let mut sc = symbol_conf(1.0, &[]);
        sc.one_shot = true;
        sc.nshots = Some(5);
        cfg.symbols.insert("ONE".to_string(), sc);

        let registry = SymbolRegistry::from_config(&cfg);
        assert_eq!(registry.symbol("ONE").unwrap().nshots, 1);
    }

    #[test]
    fn test_live_weight_reload() {
        let mut registry = SymbolRegistry::new();
        let handle = registry.add_symbol(Symbol::new("LIVE", 2.0, 1, vec![]));

        assert!(registry.set_weight("LIVE", 7.5));
        // The handle taken before the reload observes the new weight
        assert_eq!(handle.weight(), 7.5);
        assert!(!registry.set_weight("MISSING", 1.0));
    }
}
