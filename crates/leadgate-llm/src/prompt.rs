// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt construction and verdict parsing for the chat classifier.

use leadgate_core::{ClassificationRequest, ClassificationOutcome, FunnelStage, LeadgateError};
use serde::Deserialize;

/// System instruction sent with every classification call.
pub const SYSTEM_PROMPT: &str = "\
You are a sales funnel analyst for a WhatsApp sales channel. Classify the \
contact into exactly one funnel stage based on their latest message and \
conversation history.

Stages, in order:
- unknown: nothing is known about intent yet
- attraction: first contact, browsing, generic questions
- relationship: repeated engagement, specific questions, comparing options
- conversion: buying signals, asking about price, payment, or delivery terms
- customer: has purchased or confirmed a purchase

Also assign an engagement score from 0 to 100 reflecting how close the \
contact is to buying.

Respond with ONLY a JSON object, no surrounding text:
{\"stage\": \"<stage>\", \"score\": <0-100>, \"reasoning\": \"<one sentence>\"}";

/// Renders the user turn for a classification request.
pub fn build_user_prompt(request: &ClassificationRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Current stage: {}\nCurrent score: {}\n",
        request.contact.stage, request.contact.score
    ));
    if !request.history.is_empty() {
        prompt.push_str("\nConversation history (oldest first):\n");
        for body in &request.history {
            prompt.push_str(&format!("- {body}\n"));
        }
    }
    prompt.push_str(&format!("\nLatest message:\n{}", request.message));
    prompt
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    stage: String,
    score: i64,
    #[serde(default)]
    reasoning: String,
}

/// Parses the model's reply into a [`ClassificationOutcome`].
///
/// Tolerates markdown code fences around the JSON object; anything else
/// that fails to parse is an error the pipeline escalates to a human.
pub fn parse_verdict(reply: &str) -> Result<ClassificationOutcome, LeadgateError> {
    let trimmed = strip_code_fence(reply.trim());
    let raw: RawVerdict = serde_json::from_str(trimmed).map_err(|e| {
        LeadgateError::Internal(format!("classifier returned unparseable verdict: {e}"))
    })?;
    let stage: FunnelStage = raw.stage.parse().map_err(|_| {
        LeadgateError::Internal(format!("classifier returned unknown stage `{}`", raw.stage))
    })?;
    if !(0..=100).contains(&raw.score) {
        return Err(LeadgateError::Internal(format!(
            "classifier returned out-of-range score {}",
            raw.score
        )));
    }
    Ok(ClassificationOutcome {
        stage,
        score: raw.score as u8,
        reasoning: raw.reasoning,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}
