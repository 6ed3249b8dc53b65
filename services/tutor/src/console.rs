//! Renders session events as terminal output.

use gemini_realtime::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Speaker {
    Tutor,
    Learner,
}

impl Speaker {
    fn prefix(self) -> &'static str {
        match self {
            Speaker::Tutor => "tutor: ",
            Speaker::Learner => "you (heard): ",
        }
    }
}

/// Tracks the open line so streamed text from either side reads as prose.
#[derive(Debug, Default)]
pub struct Console {
    open_line: Option<Speaker>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// The exact text to print for `event`, if any.
    pub fn render(&mut self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::TextDelta(text) | SessionEvent::OutputTranscription(text) => {
                Some(self.stream(Speaker::Tutor, text))
            }
            SessionEvent::InputTranscription(text) => Some(self.stream(Speaker::Learner, text)),
            SessionEvent::TurnComplete(turn) => {
                let mut out = self.end_line();
                if turn.text.is_empty() && turn.audio.is_empty() {
                    return (!out.is_empty()).then_some(out);
                }
                if !turn.audio.is_empty() {
                    out.push_str(&format!(
                        "[{:.1}s of audio]\n",
                        turn.audio_duration().as_secs_f32()
                    ));
                }
                Some(out)
            }
            SessionEvent::Interrupted(_) => Some(self.notice("[interrupted]")),
            SessionEvent::Connected => Some(self.notice("[connected]")),
            SessionEvent::ToolCall(calls) => {
                let names: Vec<&str> = calls.iter().map(|call| call.name.as_str()).collect();
                Some(self.notice(&format!("[tool call: {}]", names.join(", "))))
            }
            SessionEvent::GoAway { time_left } => Some(self.notice(&format!(
                "[service closing in {}]",
                time_left.as_deref().unwrap_or("a moment")
            ))),
            SessionEvent::Error(message) => Some(self.notice(&format!("[error] {message}"))),
            SessionEvent::Closed { code, reason } => {
                Some(self.notice(&format!("[closed {code}: {reason}]")))
            }
            SessionEvent::Audio(_) | SessionEvent::ToolCallCancelled(_) => None,
        }
    }

    fn stream(&mut self, speaker: Speaker, text: &str) -> String {
        if self.open_line == Some(speaker) {
            return text.to_string();
        }
        let mut out = self.end_line();
        out.push_str(speaker.prefix());
        out.push_str(text);
        self.open_line = Some(speaker);
        out
    }

    fn notice(&mut self, line: &str) -> String {
        let mut out = self.end_line();
        out.push_str(line);
        out.push('\n');
        out
    }

    fn end_line(&mut self) -> String {
        match self.open_line.take() {
            Some(_) => "\n".to_string(),
            None => String::new(),
        }
    }
}
