//! Grounded prompt assembly.
//!
//! Pure: the same snapshot, retrieval outcome and request always produce the
//! same text. Sections appear in a fixed order:
//!
//! | # | Section | Content |
//! |---|---------|---------|
//! | 1 | `topology` | Network state JSON, with a staleness note if any |
//! | 2 | `summary` | `{sample_id, category, intent_text}` per match |
//! | 3 | `raw_samples` | `{intent_text, config_payload, extra_metadata}` per match |
//! | 4 | `note` | The retrieval note |
//! | 5 | `request` | The operator's text, verbatim |

use netintent_core::topology::TopologySnapshot;
use serde::Serialize;
use serde_json::Value;

use crate::context::estimate_tokens;
use crate::retrieval::RetrievalOutcome;

/// Built-in system preamble. `context.system_prompt` replaces it.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant for operators of an ONOS SDN \
controller. You take natural-language intents and produce ONOS Intent Framework JSON \
configurations. Learn the format from the retrieved examples and base the configuration on \
the current network state provided.";

/// Estimated size of one prompt section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionStats {
    pub name: &'static str,
    pub tokens: usize,
}

/// The user message sent to the model for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct GroundedPrompt {
    pub text: String,
    pub sections: Vec<SectionStats>,
}

impl GroundedPrompt {
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Stateless; exists so callers can hold the assembler alongside the other
/// pipeline stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        snapshot: &TopologySnapshot,
        retrieval: &RetrievalOutcome,
        user_text: &str,
    ) -> GroundedPrompt {
        let mut topology = String::from("Here is the current network state:\n");
        if snapshot.stale {
            let note = snapshot
                .note
                .as_deref()
                .unwrap_or("Live telemetry unavailable; state may be outdated.");
            topology.push_str(&format!("(stale) {note}\n"));
        }
        topology.push_str(&pretty(&snapshot.state_json()));
        topology.push_str("\n\n");

        let status = if retrieval.enabled { "enabled" } else { "disabled" };
        let summary = format!(
            "Here are similar intents and configs retrieved from the library ({status}):\n\
             Summary:\n{}\n",
            pretty(&to_value(&retrieval.summary()))
        );
        let raw = format!(
            "Raw samples:\n{}\n",
            pretty(&to_value(&retrieval.raw_samples()))
        );
        let note = format!("Note: {}\n", retrieval.note);
        let request = format!(
            "Now process this user request and output ONOS Intent config JSON:\n{user_text}\n"
        );

        let parts = [
            ("topology", topology),
            ("summary", summary),
            ("raw_samples", raw),
            ("note", note),
            ("request", request),
        ];

        let sections = parts
            .iter()
            .map(|(name, body)| SectionStats {
                name: *name,
                tokens: estimate_tokens(body),
            })
            .collect();
        let text = parts.into_iter().map(|(_, body)| body).collect();

        GroundedPrompt { text, sections }
    }
}

fn to_value<T: Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

fn pretty(v: &Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_default()
}
