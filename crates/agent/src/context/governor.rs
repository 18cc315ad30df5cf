//! The context governor: admit or reject a turn by estimated size.

use netintent_core::error::ContextOverflow;
use netintent_core::message::Message;
use serde::Serialize;
use tracing::{debug, warn};

use super::token::{estimate_messages_tokens, estimate_tokens};

/// Default budget in estimated tokens.
pub const DEFAULT_BUDGET_TOKENS: usize = 6000;

/// Size of an admitted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetUsage {
    pub preamble: usize,
    pub history: usize,
    pub candidate: usize,
    pub estimated: usize,
    pub budget: usize,
}

impl BudgetUsage {
    pub fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.estimated)
    }
}

/// Checks turns against a fixed budget.
#[derive(Debug, Clone)]
pub struct ContextGovernor {
    budget: usize,
    preamble: String,
}

impl ContextGovernor {
    pub fn new(preamble: impl Into<String>, budget: usize) -> Self {
        Self {
            budget,
            preamble: preamble.into(),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Sum the preamble, every stored turn and the grounded candidate.
    ///
    /// A total equal to the budget is admitted; anything above is not.
    pub fn check(
        &self,
        history: &[Message],
        candidate: &str,
    ) -> std::result::Result<BudgetUsage, ContextOverflow> {
        check_budget(&self.preamble, history, candidate, self.budget)
    }
}

impl Default for ContextGovernor {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_BUDGET_TOKENS)
    }
}

/// Budget check without a governor.
pub fn check_budget(
    preamble: &str,
    history: &[Message],
    candidate: &str,
    budget: usize,
) -> std::result::Result<BudgetUsage, ContextOverflow> {
    let usage = BudgetUsage {
        preamble: estimate_tokens(preamble),
        history: estimate_messages_tokens(history),
        candidate: estimate_tokens(candidate),
        estimated: 0,
        budget,
    };
    let estimated = usage.preamble + usage.history + usage.candidate;

    if estimated > budget {
        warn!(
            estimated,
            budget,
            history_messages = history.len(),
            "Turn exceeds context budget"
        );
        return Err(ContextOverflow { estimated, budget });
    }

    debug!(estimated, budget, "Turn fits context budget");
    Ok(BudgetUsage { estimated, ..usage })
}
