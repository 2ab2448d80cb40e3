use crate::dataset::Dataset;
use crate::session::{ChatMessage, Conversation};

pub const DATA_CONTEXT_BEGIN: &str = "-- DATA CONTEXT --";
pub const DATA_CONTEXT_END: &str = "-- END DATA CONTEXT --";

const INSTRUCTION_PREAMBLE: &str = "\
You are Catalyst, an AI assistant specializing in business analysis and data \
insights. You can interpret data, identify trends, and provide targeted \
marketing recommendations based on business metrics.

Important guidelines:
1. Do not reveal or describe your chain-of-thought, internal reasoning, or any hidden analysis.
2. Provide clear, concise, and actionable insights.
3. Focus on responding directly to the user's queries without unnecessary elaboration.
4. Maintain a professional yet helpful tone.

When you respond, provide only your final answer.";

/// Bounded text snapshot of a dataset: the first `max_columns` column names
/// in original order, plus the descriptive statistics table with every value
/// rendered to two decimal places. Datasets without numeric columns get an
/// empty statistics block.
pub fn dataset_snapshot(dataset: &Dataset, max_columns: usize) -> String {
    let shown = dataset.columns().len().min(max_columns);
    let columns = dataset.columns()[..shown].join(", ");

    let mut out = String::new();
    out.push_str(&format!(
        "(Showing only the first {max_columns} columns to conserve space)\n"
    ));
    out.push_str(&format!("Columns: {columns}\n"));
    out.push_str("\nSummary (rounded to 2 decimals):\n");
    for s in dataset.describe() {
        out.push_str(&format!(
            "{}  count={:.2}  mean={:.2}  std={:.2}  min={:.2}  25%={:.2}  50%={:.2}  75%={:.2}  max={:.2}\n",
            s.column, s.count as f64, s.mean, s.std, s.min, s.q25, s.median, s.q75, s.max
        ));
    }
    out
}

/// Message list for one model call: a synthesized system message carrying the
/// instruction preamble and the dataset snapshot, then the trailing window of
/// the conversation. Truncation is by message count, not token count, so
/// content length is not strictly bounded.
pub fn assemble_prompt(
    snapshot: &str,
    conversation: &Conversation,
    history_window: usize,
) -> Vec<ChatMessage> {
    let system = format!(
        "{INSTRUCTION_PREAMBLE}\n\n{DATA_CONTEXT_BEGIN}\n{snapshot}{DATA_CONTEXT_END}"
    );
    let mut messages = Vec::with_capacity(history_window + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(conversation.tail(history_window).iter().cloned());
    messages
}
