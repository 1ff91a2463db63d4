use crate::config::{ScanConfig, DEFAULT_GROW_FACTOR, DEFAULT_MAX_SHOTS};
use crate::scoring::{MetricResult, SymbolResult};
use crate::symbols::{Symbol, SymbolGroup};
use crate::task::{stage, Task, TaskSettings};

/// Flags modifying a single insertion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertFlags {
    /// Force single-shot semantics for this call.
    pub single: bool,
    /// Score unknown symbols at the supplied weight instead of zero.
    pub enforce: bool,
}

impl InsertFlags {
    pub const NONE: InsertFlags = InsertFlags {
        single: false,
        enforce: false,
    };
    pub const SINGLE: InsertFlags = InsertFlags {
        single: true,
        enforce: false,
    };
    pub const ENFORCE: InsertFlags = InsertFlags {
        single: false,
        enforce: true,
    };
}

/// Amplify a positive contribution by the accumulated grow factor.
///
/// Returns the adjusted contribution and the factor to store on commit: the
/// stored factor compounds by the configured factor on every positive
/// commit, while a non-positive commit resets it to 1.0.
fn apply_grow_factor(contribution: f64, grow_factor: f64, config_factor: f64) -> (f64, f64) {
    if contribution > 0.0 {
        if grow_factor != 0.0 {
            (contribution * grow_factor, grow_factor * config_factor)
        } else {
            (contribution, config_factor)
        }
    } else {
        (contribution, 1.0)
    }
}

/// Cap a positive contribution against one group's remaining budget.
///
/// Returns None when the group budget is already exhausted.
fn check_group_score(
    message_id: &str,
    symbol: &str,
    group: &SymbolGroup,
    group_score: f64,
    w: f64,
) -> Option<f64> {
    if group.max_score > 0.0 && w > 0.0 {
        if group_score >= group.max_score {
            log::info!(
                "<{message_id}>: maximum group score {:.2} for group {} has been reached, \
                 ignoring symbol {symbol} with weight {w:.2}",
                group.max_score,
                group.name
            );
            return None;
        } else if group_score + w > group.max_score {
            return Some(group.max_score - group_score);
        }
    }

    Some(w)
}

/// Run a contribution through the symbol's groups in order.
///
/// Each group accumulates the value it admits; the working contribution
/// shrinks to the strictest cap seen so far. Returns None when any group is
/// exhausted; earlier groups keep what they already accumulated.
fn apply_group_caps(
    message_id: &str,
    result: &mut MetricResult,
    symbol: &str,
    sdef: &Symbol,
    mut w: f64,
) -> Option<f64> {
    for group in &sdef.groups {
        let group_score = result.group_score_entry(&group.name);
        let cur = check_group_score(message_id, symbol, group, *group_score, w)?;
        *group_score += cur;
        if cur < w {
            w = cur;
        }
    }

    Some(w)
}

/// Record an option string on a symbol result.
///
/// Duplicates are never re-added. Symbols flagged `one_param` keep exactly
/// one option, a novel value replacing the stored one; other symbols hold at
/// most `default_max_shots` distinct options and refuse further values.
pub fn add_result_option(sres: &mut SymbolResult, default_max_shots: u32, value: &str) -> bool {
    let one_param = sres.symbol().map(|sym| sym.one_param).unwrap_or(false);
    let options = sres.ensure_options();

    if options.contains(value) {
        return false;
    }

    if one_param {
        options.clear();
        return options.insert(value);
    }

    if options.len() >= default_max_shots as usize {
        return false;
    }

    options.insert(value)
}

#[allow(clippy::too_many_arguments)]
fn insert_metric_result(
    message_id: &str,
    cfg: Option<&ScanConfig>,
    settings: Option<&TaskSettings>,
    result: &mut MetricResult,
    symbol: &str,
    mut weight: f64,
    opt: Option<&str>,
    flags: InsertFlags,
) {
    if !weight.is_finite() {
        log::warn!(
            "<{message_id}>: detected {} score for symbol {symbol}, replacing it with zero",
            if weight.is_nan() { "NaN" } else { "infinite" }
        );
        weight = 0.0;
    }

    let config_factor = cfg.map(|c| c.grow_factor).unwrap_or(DEFAULT_GROW_FACTOR);
    let default_max_shots = cfg.map(|c| c.default_max_shots).unwrap_or(DEFAULT_MAX_SHOTS);

    let sdef = cfg.and_then(|c| c.registry.symbol(symbol)).cloned();
    let mut final_score = match &sdef {
        Some(sdef) => {
            // Make the symbol's groups visible in the result even when the
            // commit later aborts
            for group in &sdef.groups {
                result.group_score_entry(&group.name);
            }
            sdef.weight() * weight
        }
        // Enforced unknown symbols keep a static weight of 1.0
        None if flags.enforce => weight,
        None => 0.0,
    };

    if let Some(corrector) = settings.and_then(|s| s.symbol_score(symbol)) {
        log::debug!(
            "settings: changed weight of symbol {symbol} from {final_score:.2} to {corrector:.2}"
        );
        final_score = corrector * weight;
    }

    if result.symbol(symbol).is_some() {
        // Update path: the symbol already fired on this message
        let mut single = flags.single;
        let mut diff = 0.0;

        if let Some(sres) = result.symbol_mut(symbol) {
            let max_shots = if single {
                1
            } else {
                match &sdef {
                    Some(sdef) => sdef.nshots,
                    None => default_max_shots as i32,
                }
            };

            if !single && max_shots > 0 && sres.nshots as i32 >= max_shots {
                single = true;
            }

            // Duplicate hits coalesce on the option string: a repeated
            // option counts as another shot, a novel one is only recorded
            match opt {
                Some(value) if sres.options().is_some() => {
                    if sres.options().map(|o| o.contains(value)).unwrap_or(false) {
                        sres.nshots += 1;
                    } else {
                        add_result_option(sres, default_max_shots, value);
                    }
                }
                _ => {
                    sres.nshots += 1;
                    if let Some(value) = opt {
                        add_result_option(sres, default_max_shots, value);
                    }
                }
            }

            if !single {
                diff = final_score;
            } else if sres.score.abs() < final_score.abs()
                && sres.score.is_sign_negative() == final_score.is_sign_negative()
            {
                // Replace a less significant same-sign score with a more
                // significant one
                diff = final_score - sres.score;
            }
        }

        if diff != 0.0 {
            let (adjusted, next_gf) = apply_grow_factor(diff, result.grow_factor, config_factor);
            let capped = match &sdef {
                Some(sdef) => apply_group_caps(message_id, result, symbol, sdef, adjusted),
                None => Some(adjusted),
            };

            if let Some(capped) = capped {
                result.score += capped;
                result.grow_factor = next_gf;

                if let Some(sres) = result.symbol_mut(symbol) {
                    if single {
                        sres.score = final_score;
                    } else {
                        sres.score += capped;
                    }
                }
            }
        }
    } else {
        // Insert path: first hit of this symbol
        let mut sres = SymbolResult::new(symbol, sdef.clone());

        let (adjusted, next_gf) =
            apply_grow_factor(final_score, result.grow_factor, config_factor);
        let capped = match &sdef {
            Some(sdef) => apply_group_caps(message_id, result, symbol, sdef, adjusted),
            None => Some(adjusted),
        };

        match capped {
            Some(committed) => {
                result.score += committed;
                result.grow_factor = next_gf;
                sres.score = committed;

                if committed > f64::EPSILON {
                    result.npositive += 1;
                    result.positive_score += committed;
                } else if committed < -f64::EPSILON {
                    result.nnegative += 1;
                    result.negative_score += committed.abs();
                }

                final_score = committed;
            }
            None => {
                // Group budget exhausted: keep the symbol for traceability,
                // without any score contribution
                sres.score = 0.0;
                final_score = f64::NAN;
            }
        }

        if let Some(value) = opt {
            add_result_option(&mut sres, default_max_shots, value);
        }

        result.insert_symbol(sres);
    }

    if let Some(sres) = result.symbol(symbol) {
        log::debug!(
            "<{message_id}>: symbol {symbol}, score {:.2}, factor: {final_score}",
            sres.score
        );
    }
}

impl Task {
    /// Insert a symbol hit with default flags.
    pub fn insert_result(
        &mut self,
        symbol: &str,
        weight: f64,
        opt: Option<&str>,
    ) -> Option<&mut SymbolResult> {
        self.insert_result_full(symbol, weight, opt, InsertFlags::NONE)
    }

    /// Insert a symbol hit into this task's metric result.
    ///
    /// Refused once the task reached the idempotent phase. Returns the
    /// accumulated per-symbol result on success.
    pub fn insert_result_full(
        &mut self,
        symbol: &str,
        weight: f64,
        opt: Option<&str>,
        flags: InsertFlags,
    ) -> Option<&mut SymbolResult> {
        if self.has_stage(stage::IDEMPOTENT) {
            log::error!(
                "<{}>: cannot insert symbol {symbol} on idempotent phase",
                self.message_id
            );
            return None;
        }

        let cfg = self.cfg.clone();
        self.create_metric_result();

        insert_metric_result(
            &self.message_id,
            cfg.as_deref(),
            self.settings.as_ref(),
            self.result.as_mut()?,
            symbol,
            weight,
            opt,
            flags,
        );

        if let Some(cache) = cfg.as_ref().and_then(|c| c.cache.as_ref()) {
            cache.inc_frequency(symbol);
        }

        self.result.as_mut()?.symbol_mut(symbol)
    }

    /// Attach an option to an already recorded symbol result.
    pub fn add_result_option(&mut self, symbol: &str, value: &str) -> bool {
        let default_max_shots = self
            .cfg
            .as_deref()
            .map(|c| c.default_max_shots)
            .unwrap_or(DEFAULT_MAX_SHOTS);

        match self.result.as_mut().and_then(|r| r.symbol_mut(symbol)) {
            Some(sres) => add_result_option(sres, default_max_shots, value),
            None => false,
        }
    }
}
