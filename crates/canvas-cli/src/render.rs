//! Incremental terminal rendering of conversation events

use std::io::{self, Write};

use canvas_ai::{Role, split_thinking};
use canvas_assistant::{ChatEvent, TurnEndReason};

/// Prints streamed text as it grows, plus tool and turn notices
pub struct StreamPrinter<W: Write> {
    out: W,
    /// Characters of visible text already written for the active turn
    printed: usize,
}

impl<W: Write> StreamPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    /// Render one event. Returns `true` when a turn ended.
    pub fn handle(&mut self, event: &ChatEvent) -> io::Result<bool> {
        match event {
            ChatEvent::TurnStarted { .. } => {
                self.printed = 0;
            }
            ChatEvent::PartialText { text, .. } => {
                self.write_suffix(streamed_visible_text(text))?;
            }
            ChatEvent::MessageAppended { message, .. }
                if message.role == Role::Assistant && !message.has_tool_calls() =>
            {
                self.write_suffix(message.visible_text())?;
                writeln!(self.out)?;
                self.printed = 0;
            }
            ChatEvent::ToolExecutionStart { capability, .. } => {
                self.break_line()?;
                writeln!(self.out, "[Running {}...]", capability)?;
            }
            ChatEvent::ToolExecutionEnd {
                capability,
                is_error,
                ..
            } => {
                if *is_error {
                    writeln!(self.out, "[{} failed]", capability)?;
                } else {
                    writeln!(self.out, "[{} done]", capability)?;
                }
            }
            ChatEvent::TurnEnded { outcome, .. } => {
                if *outcome == TurnEndReason::Cancelled {
                    self.break_line()?;
                    writeln!(self.out, "[Cancelled]")?;
                }
                self.printed = 0;
                self.out.flush()?;
                return Ok(true);
            }
            ChatEvent::Error { message } => {
                self.break_line()?;
                writeln!(self.out, "Error: {}", message)?;
            }
            ChatEvent::MessageAppended { .. } => {}
        }
        self.out.flush()?;
        Ok(false)
    }

    fn write_suffix(&mut self, visible: &str) -> io::Result<()> {
        let suffix: String = visible.chars().skip(self.printed).collect();
        if !suffix.is_empty() {
            self.printed += suffix.chars().count();
            write!(self.out, "{}", suffix)?;
        }
        Ok(())
    }

    fn break_line(&mut self) -> io::Result<()> {
        if self.printed > 0 {
            writeln!(self.out)?;
            self.printed = 0;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// Visible part of a partial reply. A reply that so far is only the start of
/// `<think>` may still open a thinking block, so nothing of it is shown yet.
fn streamed_visible_text(text: &str) -> &str {
    let head = text.trim();
    if !head.is_empty() && THINK_OPEN.starts_with(head) {
        return "";
    }
    split_thinking(text).1
}

const THINK_OPEN: &str = "<think>";

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_ai::Message;
    use uuid::Uuid;

    fn render(events: &[ChatEvent]) -> String {
        let mut printer = StreamPrinter::new(Vec::new());
        for event in events {
            printer.handle(event).unwrap();
        }
        String::from_utf8(printer.into_inner()).unwrap()
    }

    fn partial(turn_id: Uuid, text: &str) -> ChatEvent {
        ChatEvent::PartialText {
            turn_id,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_streams_only_new_text() {
        let id = Uuid::new_v4();
        let out = render(&[
            ChatEvent::TurnStarted { turn_id: id },
            partial(id, "Hel"),
            partial(id, "Hello"),
            ChatEvent::MessageAppended {
                index: 2,
                message: Message::assistant("Hello!"),
            },
            ChatEvent::TurnEnded {
                turn_id: id,
                outcome: TurnEndReason::Completed,
            },
        ]);
        assert_eq!(out, "Hello!\n");
    }

    #[test]
    fn test_hides_thinking() {
        let id = Uuid::new_v4();
        let out = render(&[
            ChatEvent::TurnStarted { turn_id: id },
            partial(id, "<think>let me see"),
            partial(id, "<think>let me see</think>42"),
            ChatEvent::MessageAppended {
                index: 2,
                message: Message::assistant("<think>let me see</think>42"),
            },
        ]);
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_holds_back_partial_think_tag() {
        let id = Uuid::new_v4();
        let out = render(&[
            ChatEvent::TurnStarted { turn_id: id },
            partial(id, "<th"),
            partial(id, "<think>x</think>Hello"),
            ChatEvent::MessageAppended {
                index: 2,
                message: Message::assistant("<think>x</think>Hello"),
            },
        ]);
        assert_eq!(out, "Hello\n");

        // A reply that merely starts with "<" is shown once it diverges
        let out = render(&[
            ChatEvent::TurnStarted { turn_id: id },
            partial(id, "<"),
            partial(id, "<b>bold"),
            ChatEvent::MessageAppended {
                index: 2,
                message: Message::assistant("<b>bold"),
            },
        ]);
        assert_eq!(out, "<b>bold\n");
    }

    #[test]
    fn test_cancel_breaks_line() {
        let id = Uuid::new_v4();
        let mut printer = StreamPrinter::new(Vec::new());
        printer.handle(&ChatEvent::TurnStarted { turn_id: id }).unwrap();
        printer.handle(&partial(id, "Partial")).unwrap();
        let ended = printer
            .handle(&ChatEvent::TurnEnded {
                turn_id: id,
                outcome: TurnEndReason::Cancelled,
            })
            .unwrap();

        assert!(ended);
        let out = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(out, "Partial\n[Cancelled]\n");
    }

    #[test]
    fn test_tool_notices_and_errors() {
        let out = render(&[
            ChatEvent::MessageAppended {
                index: 1,
                message: Message::user("Title this"),
            },
            ChatEvent::ToolExecutionStart {
                call_id: "c1".into(),
                capability: "set_title".into(),
            },
            ChatEvent::ToolExecutionEnd {
                call_id: "c1".into(),
                capability: "set_title".into(),
                is_error: false,
            },
            ChatEvent::Error {
                message: "Transport error: boom".into(),
            },
        ]);
        assert_eq!(
            out,
            "[Running set_title...]\n[set_title done]\nError: Transport error: boom\n"
        );
    }
}
