//! Prompt construction for insight generation.
//!
//! Records are serialized one per line so the character budget can be
//! enforced at record boundaries: a truncated prompt never ends mid-record,
//! it ends at the last complete line plus a marker. Oversized input is the
//! designed degradation path, never an error.

use std::fmt::Write as _;

use crate::models::{CostRecord, InsightKind};

/// Rough character ceiling for serialized record data, tuned to stay well
/// inside the model's context window.
pub const DEFAULT_PROMPT_BUDGET_CHARS: usize = 8000;

pub const TRUNCATION_MARKER: &str = "...";

const PREAMBLE: &str = "You are a cloud financial operations analyst.";

/// Optional scoping clauses rendered into the prompt header. Only the
/// clauses that apply are rendered.
#[derive(Debug, Clone, Default)]
pub struct PromptScope {
    pub project: Option<String>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            budget_chars: DEFAULT_PROMPT_BUDGET_CHARS,
        }
    }
}

impl PromptBuilder {
    pub fn with_budget(budget_chars: usize) -> Self {
        Self { budget_chars }
    }

    /// Build the full prompt for one insight request.
    ///
    /// An empty record set yields a "no data available" prompt for every
    /// kind except `natural_query`, where the model may still answer the
    /// question in general terms.
    pub fn build(
        &self,
        kind: &InsightKind,
        query: Option<&str>,
        scope: &PromptScope,
        records: &[CostRecord],
    ) -> String {
        let instruction = instruction_for(kind, query);

        let mut prompt = String::new();
        prompt.push_str(PREAMBLE);
        prompt.push('\n');
        if let Some(header) = scope_header(scope) {
            prompt.push_str(&header);
            prompt.push('\n');
        }

        if records.is_empty() && *kind != InsightKind::NaturalQuery {
            let _ = write!(prompt, "\nNo data available to {instruction}.");
            return prompt;
        }

        let data = self.serialize_records(records);
        let _ = write!(
            prompt,
            "\nAnalyze the following cloud spend data:\n\n{data}\n\n\
             Based on this data, please {instruction}. \
             Be concise, clear, and actionable. Focus on key insights."
        );
        prompt
    }

    fn serialize_records(&self, records: &[CostRecord]) -> String {
        let serialized = records
            .iter()
            .map(record_line)
            .collect::<Vec<_>>()
            .join("\n");
        if serialized.chars().count() <= self.budget_chars {
            return serialized;
        }

        let cutoff = serialized
            .char_indices()
            .nth(self.budget_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(serialized.len());
        let mut truncated = match serialized[..cutoff].rfind('\n') {
            Some(last_newline) => serialized[..last_newline].to_string(),
            None => serialized[..cutoff].to_string(),
        };
        truncated.push('\n');
        truncated.push_str(TRUNCATION_MARKER);

        tracing::warn!(
            original_chars = serialized.chars().count(),
            truncated_chars = truncated.chars().count(),
            "prompt input truncated, the model will analyze partial data"
        );
        truncated
    }
}

fn record_line(record: &CostRecord) -> String {
    let usage_amount = record
        .usage_amount
        .map(|a| a.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let usage_unit = record.usage_unit.as_deref().unwrap_or("");
    format!(
        "- Service: {}, Project: {}, SKU: {}, Time: {}, Cost: {:.2} {}, Usage: {usage_amount} {usage_unit}",
        record.service,
        record.project,
        record.sku,
        record.time_period.format("%Y-%m-%d"),
        record.cost,
        record.currency,
    )
}

fn scope_header(scope: &PromptScope) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(project) = &scope.project {
        clauses.push(format!("project {project}"));
    }
    if let Some(start) = scope.start_date {
        clauses.push(format!("from {start}"));
    }
    if let Some(end) = scope.end_date {
        clauses.push(format!("to {end}"));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(format!("Scope: {}.", clauses.join(", ")))
    }
}

/// Total mapping from insight kind to instruction text. Unknown kinds fall
/// through to a generic analysis instruction so no request goes unhandled.
fn instruction_for(kind: &InsightKind, query: Option<&str>) -> String {
    match kind {
        InsightKind::Summary | InsightKind::SpendSummary => {
            "summarize the cloud spend trends and key cost drivers".to_string()
        }
        InsightKind::Anomaly => {
            "identify any unusual spending patterns or anomalies and explain them".to_string()
        }
        InsightKind::RootCause => {
            "attribute the observed spend to its most likely drivers, naming the services, \
             projects, and SKUs responsible"
                .to_string()
        }
        InsightKind::Prediction => {
            "project how this spend is likely to develop, stating the assumptions behind the \
             projection"
                .to_string()
        }
        InsightKind::Recommendation => {
            "provide specific and actionable cost optimization recommendations".to_string()
        }
        InsightKind::NaturalQuery => match query {
            Some(q) => format!(
                "answer the following question, stating explicitly if the data is insufficient: {q}"
            ),
            None => "answer the user's question about this spend data".to_string(),
        },
        InsightKind::Other(_) => match query {
            Some(q) => q.to_string(),
            None => "analyze the data and report the most important findings".to_string(),
        },
    }
}
