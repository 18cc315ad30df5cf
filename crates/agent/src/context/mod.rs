//! Context budgeting for chat turns.
//!
//! Every turn is checked against a fixed token budget before the model is
//! called. Nothing is trimmed: a turn that does not fit is rejected and the
//! operator is asked to start a new conversation.
//!
//! | Part | Source |
//! |------|--------|
//! | Preamble | System prompt |
//! | History | Every stored turn of the conversation |
//! | Candidate | The grounded prompt for this turn |

pub mod governor;
pub mod token;

pub use governor::{BudgetUsage, ContextGovernor, check_budget};
pub use token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
