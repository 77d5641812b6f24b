//! Terminal front-end: command parsing and event rendering.

use parley_agent::AgentEvent;
use parley_core::Message;

pub const HELP: &str = "\
Type a question and press enter. Commands:
  /listen      capture a spoken question
  /stop        stop capturing early
  /quiet       stop speaking
  /voice on    speak answers aloud
  /voice off   text only
  /voices      list synthesizer voices
  /history     print the conversation
  /help        show this help
  /quit        exit";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Empty,
    Query(String),
    Listen,
    Stop,
    Quiet,
    Voice(bool),
    Voices,
    History,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Query(line.to_string());
        }

        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        match (name, arg) {
            ("/listen", None) => Command::Listen,
            ("/stop", None) => Command::Stop,
            ("/quiet", None) => Command::Quiet,
            ("/voice", Some("on")) => Command::Voice(true),
            ("/voice", Some("off")) => Command::Voice(false),
            ("/voices", None) => Command::Voices,
            ("/history", None) => Command::History,
            ("/help", None) => Command::Help,
            ("/quit" | "/exit", None) => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

/// Turns agent events into terminal output.
///
/// Streamed chunks are written inline; the final answer message then only
/// closes the line, unless it differs from what was streamed.
#[derive(Debug, Default)]
pub struct EventPrinter {
    /// Text streamed so far for the current answer.
    streamed: Option<String>,
}

impl EventPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for `event`, if any.
    pub fn render(&mut self, event: &AgentEvent) -> Option<String> {
        match event {
            AgentEvent::StateChanged { to, .. } => {
                if self.streamed.is_some() {
                    return None;
                }
                Some(format!("  [{to}]\n"))
            }
            AgentEvent::Chunk(chunk) => match &mut self.streamed {
                Some(streamed) => {
                    streamed.push_str(chunk);
                    Some(chunk.clone())
                }
                None => {
                    self.streamed = Some(chunk.clone());
                    Some(format!("parley> {chunk}"))
                }
            },
            AgentEvent::MessageAppended(message) if message.is_user => None,
            AgentEvent::MessageAppended(message) if message.is_loading => {
                Some(format!("  {}\n", message.text))
            }
            AgentEvent::MessageAppended(message) => match self.streamed.take() {
                Some(streamed) if streamed == message.text => Some("\n".to_string()),
                Some(_) => Some(format!("\nparley> {}\n", message.text)),
                None => Some(format!("parley> {}\n", message.text)),
            },
            AgentEvent::MessageRemoved(_) => None,
            AgentEvent::Notice(text) => Some(format!("! {text}\n")),
        }
    }
}

/// The whole conversation, one line per message.
pub fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "(no messages yet)\n".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let who = if m.is_user { "you" } else { "parley" };
            format!("{} {}> {}\n", m.timestamp.format("%H:%M:%S"), who, m.text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ActivityState;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(
            Command::parse("  What is Rust? "),
            Command::Query("What is Rust?".to_string())
        );
        assert_eq!(Command::parse("/listen"), Command::Listen);
        assert_eq!(Command::parse("/stop"), Command::Stop);
        assert_eq!(Command::parse("/quiet"), Command::Quiet);
        assert_eq!(Command::parse("/voice on"), Command::Voice(true));
        assert_eq!(Command::parse("/voice  off"), Command::Voice(false));
        assert_eq!(Command::parse("/voices"), Command::Voices);
        assert_eq!(Command::parse("/history"), Command::History);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(
            Command::parse("/voice maybe"),
            Command::Unknown("/voice maybe".to_string())
        );
        assert_eq!(
            Command::parse("/dance"),
            Command::Unknown("/dance".to_string())
        );
    }

    #[test]
    fn test_render_whole_answer() {
        let mut printer = EventPrinter::new();
        assert_eq!(
            printer.render(&AgentEvent::MessageAppended(Message::user("q"))),
            None
        );
        assert_eq!(
            printer
                .render(&AgentEvent::StateChanged {
                    from: ActivityState::Idle,
                    to: ActivityState::Thinking,
                })
                .as_deref(),
            Some("  [Thinking]\n")
        );
        assert_eq!(
            printer
                .render(&AgentEvent::MessageAppended(Message::agent("Paris.")))
                .as_deref(),
            Some("parley> Paris.\n")
        );
    }

    #[test]
    fn test_render_streamed_answer_once() {
        let mut printer = EventPrinter::new();
        let out: String = [
            AgentEvent::Chunk("Par".to_string()),
            AgentEvent::Chunk("is.".to_string()),
            AgentEvent::MessageAppended(Message::agent("Paris.")),
            AgentEvent::Notice("service busy".to_string()),
        ]
        .iter()
        .filter_map(|e| printer.render(e))
        .collect();
        assert_eq!(out, "parley> Paris.\n! service busy\n");
    }

    #[test]
    fn test_render_apology_after_blank_stream() {
        let mut printer = EventPrinter::new();
        let out: String = [
            AgentEvent::Chunk("  ".to_string()),
            AgentEvent::MessageAppended(Message::agent("Sorry, something went wrong.")),
            AgentEvent::StateChanged {
                from: ActivityState::Thinking,
                to: ActivityState::Confused,
            },
        ]
        .iter()
        .filter_map(|e| printer.render(e))
        .collect();
        assert_eq!(
            out,
            "parley>   \nparley> Sorry, something went wrong.\n  [Confused]\n"
        );
    }

    #[test]
    fn test_format_history() {
        assert_eq!(format_history(&[]), "(no messages yet)\n");
        let history = format_history(&[Message::user("hi"), Message::agent("hello")]);
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("you> hi"));
        assert!(lines[1].ends_with("parley> hello"));
    }
}
