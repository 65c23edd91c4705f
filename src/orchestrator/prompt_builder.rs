//! Prompt rendering for the candidate and synthesis calls. Everything here is
//! a pure function of its inputs.

use serde_json::json;

use crate::models::internal::{ChatRecord, Summary};

const COMPLIANCE_PROMPT: &str = r#"You are a compliance summariser for diabetes patient-bot chats that should
take note of deception and non-adherence according to the provided indicators.
Audience: the prescribing doctor who will read a one-page update before the
next appointment.

================  TASK  ===============================
1. **Adherence & Progress Summary** In < {N} sentences, describe:
   - What the patient reported doing (diet, medication, activity).
   - Any successes, struggles, or trends.
   - Overall adherence status and momentum.
2. **Risk Flags** List every chat excerpt that matches an indicator below.
3. Output the exact JSON schema shown at the end.

================  INDICATOR GUIDELINES  ================
- **Inconsistency**  Flag any statement that clashes with the patient's
earlier chats.
- **Vague / Evasive Language** Watch for hedges (maybe, should, could),
sweeping generalities (always, everyone), passive phrasing, or missing
specifics (dates, quantities, names). Low-concreteness wording is a
hallmark of deceptive replies. Rate severity {low | medium | high}.
- **Engagement Level** Unusually long, highly detailed stories may
indicate a crafted (and possibly false) narrative. Either extreme can
suggest non-adherence or deception; interpret in context.
- **Gaming the System**  Identify too-perfect self-reports: identical
answers across check-ins, flawless adherence claims, or copy-pasted text.

================  IMPLICIT-RAG INSTRUCTIONS  ================
Step 1 From the full transcript, **extract up to {K} excerpts
(30 - 120 words each)** that are most relevant to any indicator above.
Step 2 Using **only those excerpts**, perform TASK 1 and 2.
Step 3 Return:

json
{
  "summary": "< {N} sentences>",
  "flags": [
    {
      "indicator": "Inconsistency",
      "excerpt": "...",
      "explanation": "..."
    },
    {
      "indicator": "VagueLanguage",
      "excerpt": "...",
      "explanation": "..."
    }
    /* 0-N more flags */
  ]
}
"#;

const SYNTHESIS_PROMPT: &str = r#"You are a verification and synthesis AI. Your task is to analyze two
different AI-generated summaries and their corresponding 'flags' based
on the same source text. Your goal is to produce a single, more
accurate and reliable final JSON output.

You will receive a JSON object with four keys: "summary1", "flags1",
"summary2", and "flags2".

**Your task is to perform two main actions:**

**1. Synthesize the Summaries:**
   - Read both `summary1` and `summary2`.
   - Combine their insights to create a single, more comprehensive
   and accurate final summary.
   - The final summary should be objective and reflect the consensus
   between the two inputs.

**2. Verify and Consolidate the Flags:**
   - Compare `flags1` and `flags2` to identify semantically equivalent flags.
   - A **Direct Match** occurs when a flag from one list clearly refers to
   the same event or statement as a flag in the other list, even if the
   wording differs slightly. Matched flags should be included once in the
   final list without any 'confidence' field.
   - A **Mismatch** occurs when a flag from either list does NOT have a clear
   semantic equivalent in the other. Mismatched flags MUST have a
   `"confidence": "low"` field added to them.
   - The final list of flags should not contain duplicates.

**Output Instructions:**
You MUST return a single, valid JSON object with two top-level keys:
- `"summary"`: The new, synthesized summary string.
- `"flags"`: The final, consolidated list of flag objects.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    max_sentences: u32,
    max_excerpts: u32,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(12, 12)
    }
}

impl PromptBuilder {
    pub fn new(max_sentences: u32, max_excerpts: u32) -> Self {
        Self {
            max_sentences,
            max_excerpts,
        }
    }

    pub fn compliance_instructions(&self) -> String {
        COMPLIANCE_PROMPT
            .replace("{N}", &self.max_sentences.to_string())
            .replace("{K}", &self.max_excerpts.to_string())
    }

    /// Instructions, then the current transcript, then every earlier one.
    pub fn build_analysis_prompt(&self, current: &ChatRecord, history: &[ChatRecord]) -> String {
        let mut sections = vec![format!(
            "Current Chat Session:\n{}",
            format_transcript(current)
        )];

        if history.is_empty() {
            sections.push("\nNo previous chats found.".to_string());
        } else {
            sections.push("\n\nPrevious Saved Chats:".to_string());
            sections.extend(history.iter().map(format_transcript));
        }

        format!(
            "{}Chat History for Analysis: {}",
            self.compliance_instructions(),
            sections.join("\n\n")
        )
    }

    pub fn build_synthesis_prompt(&self, first: &Summary, second: &Summary) -> String {
        let comparison = json!({
            "summary1": first.summary_value(),
            "flags1": first.flags_value(),
            "summary2": second.summary_value(),
            "flags2": second.flags_value(),
        });

        let encoded = serde_json::to_string_pretty(&comparison).unwrap_or_else(|_| comparison.to_string());
        format!("{}\n\n{}", SYNTHESIS_PROMPT, encoded)
    }
}

/// Render one transcript as `Chat with <patient> (<timestamp>):` followed by one line per message.
pub fn format_transcript(record: &ChatRecord) -> String {
    let lines: Vec<String> = record
        .messages
        .iter()
        .map(|msg| {
            if msg.is_human() {
                format!("{} (Patient):\t{}", msg.sender_name(), msg.text())
            } else {
                format!("Bot:\t{}", msg.text())
            }
        })
        .collect();

    format!(
        "Chat with {} ({}):\n{}",
        record.patient_name,
        record.timestamp,
        lines.join("\n")
    )
}
