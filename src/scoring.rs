use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

use crate::action::Action;
use crate::config::ScanConfig;
use crate::passthrough::PassthroughResult;
use crate::symbols::Symbol;
use crate::task::Task;

/// Smoothing applied to the symbols-per-message average.
const SYMBOLS_COUNT_ALPHA: f64 = 0.5;
/// Smallest pre-sizing hint for the per-message maps.
const MIN_SYMBOLS_HINT: usize = 4;

/// Exponentially-weighted moving average over observed values.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterEma {
    mean: f64,
}

impl CounterEma {
    pub fn update(&mut self, value: f64, alpha: f64) {
        self.mean = self.mean * (1.0 - alpha) + value * alpha;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
}

lazy_static! {
    // Average distinct symbols per message, fed back into map pre-sizing
    static ref SYMBOLS_COUNT: Mutex<CounterEma> = Mutex::new(CounterEma::default());
}

fn symbols_count_hint() -> usize {
    let mean = SYMBOLS_COUNT.lock().map(|c| c.mean()).unwrap_or(0.0);
    (mean.round() as usize).max(MIN_SYMBOLS_HINT)
}

fn note_symbols_count(count: usize) {
    if let Ok(mut counter) = SYMBOLS_COUNT.lock() {
        counter.update(count as f64, SYMBOLS_COUNT_ALPHA);
    }
}

/// Distinct options recorded on a symbol, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SymbolOptions {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl SymbolOptions {
    pub fn contains(&self, option: &str) -> bool {
        self.seen.contains(option)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(|s| s.as_str())
    }

    pub(crate) fn insert(&mut self, option: &str) -> bool {
        if self.seen.contains(option) {
            return false;
        }
        self.seen.insert(option.to_string());
        self.ordered.push(option.to_string());
        true
    }

    pub(crate) fn clear(&mut self) {
        self.seen.clear();
        self.ordered.clear();
    }
}

/// Accumulated result for one symbol that fired on a message.
#[derive(Debug, Clone)]
pub struct SymbolResult {
    name: String,
    sym: Option<Arc<Symbol>>,
    /// Score contribution of this symbol after all adjustments.
    pub score: f64,
    /// Number of counted hits; at least 1 once the symbol is recorded.
    pub nshots: u32,
    options: Option<SymbolOptions>,
}

impl SymbolResult {
    pub(crate) fn new(name: &str, sym: Option<Arc<Symbol>>) -> Self {
        SymbolResult {
            name: name.to_string(),
            sym,
            score: 0.0,
            nshots: 1,
            options: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registry definition, when the symbol was known at insert time.
    pub fn symbol(&self) -> Option<&Arc<Symbol>> {
        self.sym.as_ref()
    }

    pub fn options(&self) -> Option<&SymbolOptions> {
        self.options.as_ref()
    }

    pub fn num_options(&self) -> usize {
        self.options.as_ref().map(|o| o.len()).unwrap_or(0)
    }

    // Lazily created so dry hits carry no option map at all
    pub(crate) fn ensure_options(&mut self) -> &mut SymbolOptions {
        self.options.get_or_insert_with(SymbolOptions::default)
    }
}

/// Scoring state accumulated for a single message.
#[derive(Debug)]
pub struct MetricResult {
    symbols: HashMap<String, SymbolResult>,
    sym_groups: HashMap<String, f64>,
    /// Aggregate message score.
    pub score: f64,
    pub(crate) grow_factor: f64,
    pub npositive: u32,
    pub positive_score: f64,
    pub nnegative: u32,
    pub negative_score: f64,
    actions_limits: [f64; Action::COUNT],
    pub(crate) passthrough: Vec<PassthroughResult>,
}

impl MetricResult {
    pub(crate) fn new(cfg: Option<&ScanConfig>) -> Self {
        let actions_limits = match cfg {
            Some(cfg) => *cfg.actions_limits(),
            None => [f64::NAN; Action::COUNT],
        };

        MetricResult {
            symbols: HashMap::with_capacity(symbols_count_hint()),
            sym_groups: HashMap::with_capacity(MIN_SYMBOLS_HINT),
            score: 0.0,
            grow_factor: 0.0,
            npositive: 0,
            positive_score: 0.0,
            nnegative: 0,
            negative_score: 0.0,
            actions_limits,
            passthrough: Vec::new(),
        }
    }

    pub fn symbol(&self, name: &str) -> Option<&SymbolResult> {
        self.symbols.get(name)
    }

    pub(crate) fn symbol_mut(&mut self, name: &str) -> Option<&mut SymbolResult> {
        self.symbols.get_mut(name)
    }

    pub(crate) fn insert_symbol(&mut self, sres: SymbolResult) {
        self.symbols.insert(sres.name.clone(), sres);
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, &SymbolResult)> {
        self.symbols.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// Accumulated score of a group, once any member symbol has fired.
    pub fn group_score(&self, group: &str) -> Option<f64> {
        self.sym_groups.get(group).copied()
    }

    pub(crate) fn group_score_entry(&mut self, group: &str) -> &mut f64 {
        self.sym_groups.entry(group.to_string()).or_insert(0.0)
    }

    /// Accumulated grow factor; zero until the first positive commit.
    pub fn grow_factor(&self) -> f64 {
        self.grow_factor
    }

    /// Threshold for an action; NaN when disabled.
    pub fn action_limit(&self, action: Action) -> f64 {
        self.actions_limits[action.index()]
    }

    /// Pass-through overrides, sorted by descending priority.
    pub fn passthrough(&self) -> &[PassthroughResult] {
        &self.passthrough
    }
}

impl Drop for MetricResult {
    fn drop(&mut self) {
        note_symbols_count(self.symbols.len());
    }
}

impl Task {
    /// Get or lazily create the per-message metric result.
    ///
    /// The threshold ladder is copied from the task configuration, or left
    /// all-NaN when the task carries none; maps are pre-sized from the
    /// running symbols-per-message average.
    pub fn create_metric_result(&mut self) -> &mut MetricResult {
        let cfg = self.cfg.clone();
        self.result
            .get_or_insert_with(|| MetricResult::new(cfg.as_deref()))
    }

    /// Exact-match lookup of a recorded symbol.
    pub fn find_symbol_result(&self, symbol: &str) -> Option<&SymbolResult> {
        self.result.as_ref().and_then(|r| r.symbol(symbol))
    }

    /// Visit every recorded symbol exactly once; order is unspecified.
    pub fn symbol_result_foreach<F>(&self, mut func: F)
    where
        F: FnMut(&str, &SymbolResult),
    {
        if let Some(result) = &self.result {
            for (name, sres) in result.symbols() {
                func(name, sres);
            }
        }
    }
}
