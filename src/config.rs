use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::action::Action;
use crate::cache::SymbolCache;
use crate::symbols::SymbolRegistry;

pub const DEFAULT_GROW_FACTOR: f64 = 1.0;
pub const DEFAULT_MAX_SHOTS: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub actions: ActionsConfig,
    /// Multiplier amplifying successive positive hits within one message.
    #[serde(default = "default_grow_factor")]
    pub grow_factor: f64,
    /// Fallback cap on counted hits per symbol, and on distinct options.
    #[serde(default = "default_max_shots")]
    pub default_max_shots: u32,
    #[serde(default)]
    pub groups: HashMap<String, GroupConfig>,
    #[serde(default)]
    pub symbols: HashMap<String, SymbolConfig>,
}

fn default_grow_factor() -> f64 {
    DEFAULT_GROW_FACTOR
}

fn default_max_shots() -> u32 {
    DEFAULT_MAX_SHOTS
}

/// Score thresholds for each action; a missing entry disables the action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionsConfig {
    pub reject: Option<f64>,
    pub soft_reject: Option<f64>,
    pub rewrite_subject: Option<f64>,
    pub add_header: Option<f64>,
    pub greylist: Option<f64>,
    pub no_action: Option<f64>,
}

impl ActionsConfig {
    pub fn threshold(&self, action: Action) -> Option<f64> {
        match action {
            Action::Reject => self.reject,
            Action::SoftReject => self.soft_reject,
            Action::RewriteSubject => self.rewrite_subject,
            Action::AddHeader => self.add_header,
            Action::Greylist => self.greylist,
            Action::NoAction => self.no_action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub description: Option<String>,
    /// Cap on the group's accumulated score; omitted or non-positive means
    /// uncapped.
    pub max_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub weight: f64,
    pub description: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    /// Count at most one hit of this symbol per message.
    #[serde(default)]
    pub one_shot: bool,
    /// Keep at most one option on this symbol.
    #[serde(default)]
    pub one_param: bool,
    /// Maximum counted hits; omitted falls back to `default_max_shots`.
    pub nshots: Option<i32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            actions: ActionsConfig {
                reject: Some(15.0),
                soft_reject: None,
                rewrite_subject: None,
                add_header: Some(6.0),
                greylist: Some(4.0),
                no_action: None,
            },
            grow_factor: DEFAULT_GROW_FACTOR,
            default_max_shots: DEFAULT_MAX_SHOTS,
            groups: HashMap::new(),
            symbols: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Compiled, per-scan view of the configuration that tasks carry.
///
/// Thresholds are flattened into a ladder indexed by action slot, with NaN
/// marking disabled actions; the symbol tables are resolved into a registry
/// of shared definitions.
#[derive(Debug)]
pub struct ScanConfig {
    actions_limits: [f64; Action::COUNT],
    pub grow_factor: f64,
    pub default_max_shots: u32,
    pub registry: SymbolRegistry,
    pub cache: Option<Arc<SymbolCache>>,
}

impl ScanConfig {
    /// An empty profile: every action disabled, default knobs.
    pub fn new(registry: SymbolRegistry) -> Self {
        ScanConfig {
            actions_limits: [f64::NAN; Action::COUNT],
            grow_factor: DEFAULT_GROW_FACTOR,
            default_max_shots: DEFAULT_MAX_SHOTS,
            registry,
            cache: None,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let mut scan = ScanConfig::new(SymbolRegistry::from_config(cfg));
        scan.grow_factor = cfg.grow_factor;
        scan.default_max_shots = cfg.default_max_shots;
        for action in Action::ALL {
            if let Some(score) = cfg.actions.threshold(action) {
                scan.actions_limits[action.index()] = score;
            }
        }
        scan
    }

    pub fn with_cache(mut self, cache: Arc<SymbolCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn set_action_limit(&mut self, action: Action, score: f64) {
        self.actions_limits[action.index()] = score;
    }

    /// Threshold for an action; NaN when the action is disabled.
    pub fn action_limit(&self, action: Action) -> f64 {
        self.actions_limits[action.index()]
    }

    pub fn actions_limits(&self) -> &[f64; Action::COUNT] {
        &self.actions_limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.actions.reject, Some(15.0));
        assert_eq!(config.actions.soft_reject, None);
        assert_eq!(config.grow_factor, 1.0);
        assert_eq!(config.default_max_shots, 100);
        assert!(config.symbols.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
actions:
  reject: 15.0
  greylist: 4.0
grow_factor: 1.1
groups:
  phishing:
    max_score: 10.0
symbols:
  FAKE_SENDER:
    weight: 4.0
    groups: [phishing]
    one_param: true
"#;
        let config: Config = serde_yaml::from_str(yaml).expect("valid config");
        assert_eq!(config.actions.reject, Some(15.0));
        assert_eq!(config.actions.add_header, None);
        assert_eq!(config.grow_factor, 1.1);
        assert_eq!(config.default_max_shots, DEFAULT_MAX_SHOTS);

        let sc = &config.symbols["FAKE_SENDER"];
        assert_eq!(sc.weight, 4.0);
        assert!(sc.one_param);
        assert_eq!(sc.groups, vec!["phishing".to_string()]);
    }

    #[test]
    fn test_scan_config_compile() {
        let mut config = Config::default();
        config.symbols.insert(
            "FOO".to_string(),
            SymbolConfig {
                weight: 5.0,
                description: None,
                groups: vec![],
                one_shot: false,
                one_param: false,
                nshots: None,
            },
        );

        let scan = ScanConfig::from_config(&config);
        assert_eq!(scan.action_limit(Action::Reject), 15.0);
        assert!(scan.action_limit(Action::SoftReject).is_nan());
        assert!(scan.action_limit(Action::NoAction).is_nan());
        assert_eq!(scan.registry.symbol("FOO").unwrap().weight(), 5.0);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).expect("serializable");
        let parsed: Config = serde_yaml::from_str(&yaml).expect("parseable");
        assert_eq!(parsed.actions.reject, config.actions.reject);
        assert_eq!(parsed.default_max_shots, config.default_max_shots);
    }
}
