//! Slash commands for interactive mode

use canvas_ai::{Message, Role};

use crate::capabilities::ChartConfig;

/// Result of parsing a slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Cancel the reply being streamed
    Stop,
    /// Show recent inputs
    History,
    /// Show the conversation log
    Messages,
    /// Show the current chart configuration
    Chart,
    /// Forget recent inputs
    ClearHistory,
    /// Show a message to the user (not sent to the assistant)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command; `None` means the input is a chat message
pub fn parse_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();
    let command = input.strip_prefix('/')?;
    let command = command
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),
        "stop" | "s" => CommandResult::Stop,
        "history" => CommandResult::History,
        "messages" | "m" => CommandResult::Messages,
        "chart" => CommandResult::Chart,
        "clear-history" => CommandResult::ClearHistory,
        "quit" | "exit" | "q" => CommandResult::Exit,
        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /stop, /s            Cancel the reply being streamed (Ctrl-C works too)
  /history             Show your recent inputs, newest first
  /messages, /m        Show the conversation so far
  /chart               Show the chart the assistant configured
  /clear-history       Forget your recent inputs
  /quit, /exit, /q     Exit canvas-chat

Anything else is sent to the assistant."#
        .to_string()
}

/// Recent inputs, numbered newest first
pub fn format_history(entries: &[String]) -> String {
    if entries.is_empty() {
        return "No inputs yet.".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{:>3}  {}", i + 1, entry))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per log entry
pub fn format_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| format!("[{}] {}: {}", i, message.role.as_str(), summarize(message)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn summarize(message: &Message) -> String {
    if message.has_tool_calls() {
        let calls: Vec<String> = message
            .tool_calls
            .iter()
            .map(|call| format!("{}({})", call.name, truncate_chars(&call.arguments, 40)))
            .collect();
        return format!("calls {}", calls.join(", "));
    }

    let text = match message.role {
        Role::Assistant => message.visible_text(),
        _ => message.content.as_str(),
    };
    let text = truncate_chars(&text.replace('\n', " "), 80);
    match (&message.tool_call_id, message.is_error) {
        (Some(id), true) => format!("{} (error) {}", id, text),
        (Some(id), false) => format!("{} {}", id, text),
        _ => text,
    }
}

pub fn format_chart(chart: Option<&ChartConfig>) -> String {
    let Some(chart) = chart else {
        return "No chart configured yet.".to_string();
    };
    let mut lines = vec![
        format!("{} ({} chart)", chart.title, chart.chart_type.as_str()),
        format!("  x: {} [{}]", chart.x_label, chart.x_field),
        format!("  y: {} [{}]", chart.y_label, chart.y_field),
    ];
    if let Some(group) = &chart.dataset_group {
        lines.push(format!("  grouped by: {}", group));
    }
    lines.push(format!("  sql: {}", chart.sql));
    lines.join("\n")
}

/// Truncate to at most `max` characters, marking the cut with `...`
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
