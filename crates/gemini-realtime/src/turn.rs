//! Reassembles streamed `serverContent` frames into turns.

use crate::protocol::{Part, ServerContent};
use chrono::{DateTime, Utc};
use parla_audio::AudioFragment;
use std::time::Duration;
use tracing::warn;

/// Where a streamed fragment went; the samples themselves are not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRef {
    pub seq: u64,
    pub duration: Duration,
}

/// One unit of model output, bounded by completion or interruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Text parts concatenated in arrival order.
    pub text: String,
    pub audio: Vec<FragmentRef>,
    pub started_at: DateTime<Utc>,
    pub complete: bool,
    pub interrupted: bool,
}

impl Turn {
    fn begin() -> Self {
        Self {
            text: String::new(),
            audio: Vec::new(),
            started_at: Utc::now(),
            complete: false,
            interrupted: false,
        }
    }

    pub fn audio_duration(&self) -> Duration {
        self.audio.iter().map(|fragment| fragment.duration).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutput {
    Text(String),
    /// Emitted as soon as it is decoded, ahead of turn completion.
    Audio(AudioFragment),
    Completed(Turn),
    /// The turn was cut off; any audio already emitted must not play.
    Interrupted(Turn),
}

/// Holds the single in-progress turn of one session.
#[derive(Debug, Default)]
pub struct TurnAggregator {
    current: Option<Turn>,
    next_seq: u64,
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a turn has started and not yet finished.
    pub fn in_progress(&self) -> bool {
        self.current.is_some()
    }

    /// Feeds one frame through the accumulator, returning what it produced
    /// in order.
    pub fn ingest(&mut self, content: ServerContent) -> Vec<TurnOutput> {
        let mut outputs = Vec::new();

        if content.interrupted {
            // Audio riding on the interrupting frame is already stale.
            let mut turn = self.current.take().unwrap_or_else(Turn::begin);
            for part in content.parts {
                if let Part::Text(text) = part {
                    turn.text.push_str(&text);
                }
            }
            turn.interrupted = true;
            outputs.push(TurnOutput::Interrupted(turn));
            return outputs;
        }

        for part in content.parts {
            let turn = self.current.get_or_insert_with(Turn::begin);
            match part {
                Part::Text(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    turn.text.push_str(&text);
                    outputs.push(TurnOutput::Text(text));
                }
                Part::InlineAudio(audio) => {
                    self.next_seq += 1;
                    match audio.to_fragment(self.next_seq) {
                        Ok(fragment) => {
                            turn.audio.push(FragmentRef {
                                seq: fragment.seq(),
                                duration: fragment.duration(),
                            });
                            outputs.push(TurnOutput::Audio(fragment));
                        }
                        Err(e) => warn!(error = %e, "Dropping undecodable audio part"),
                    }
                }
            }
        }

        if content.turn_complete {
            let mut turn = self.current.take().unwrap_or_else(Turn::begin);
            turn.complete = true;
            outputs.push(TurnOutput::Completed(turn));
        }
        outputs
    }

    /// Drops the in-progress turn without emitting it, e.g. when the
    /// connection ends.
    pub fn reset(&mut self) -> Option<Turn> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InlineAudio;
    use parla_audio::PcmFormat;

    fn text(parts: &[&str]) -> ServerContent {
        ServerContent {
            parts: parts.iter().map(|p| Part::text(*p)).collect(),
            ..ServerContent::default()
        }
    }

    fn audio(bytes: usize) -> Part {
        Part::InlineAudio(InlineAudio::new(PcmFormat::OUTPUT, vec![0u8; bytes]))
    }

    fn complete() -> ServerContent {
        ServerContent {
            turn_complete: true,
            ..ServerContent::default()
        }
    }

    fn interrupted() -> ServerContent {
        ServerContent {
            interrupted: true,
            ..ServerContent::default()
        }
    }

    fn completed_text(outputs: &[TurnOutput]) -> Option<&str> {
        outputs.iter().find_map(|output| match output {
            TurnOutput::Completed(turn) => Some(turn.text.as_str()),
            _ => None,
        })
    }

    #[test]
    fn test_text_split_across_frames_is_concatenated() {
        let splits: [&[&[&str]]; 3] = [
            &[&["Hi there!"]],
            &[&["Hi"], &[" there!"]],
            &[&["H", "i"], &[], &[" th", "ere", "!"]],
        ];
        for frames in splits {
            let mut aggregator = TurnAggregator::new();
            for parts in frames {
                let outputs = aggregator.ingest(text(parts));
                assert!(completed_text(&outputs).is_none());
            }
            let outputs = aggregator.ingest(complete());
            assert_eq!(completed_text(&outputs), Some("Hi there!"));
            assert!(!aggregator.in_progress());
        }
    }

    #[test]
    fn test_text_deltas_are_emitted_as_they_arrive() {
        let mut aggregator = TurnAggregator::new();
        let outputs = aggregator.ingest(text(&["Hi", " there"]));
        assert_eq!(
            outputs,
            vec![
                TurnOutput::Text("Hi".into()),
                TurnOutput::Text(" there".into())
            ]
        );
    }

    #[test]
    fn test_audio_is_emitted_immediately_with_increasing_seq() {
        let mut aggregator = TurnAggregator::new();
        let outputs = aggregator.ingest(ServerContent {
            parts: vec![audio(480), Part::text("a"), audio(960)],
            ..ServerContent::default()
        });
        let seqs: Vec<u64> = outputs
            .iter()
            .filter_map(|o| match o {
                TurnOutput::Audio(fragment) => Some(fragment.seq()),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(matches!(outputs[1], TurnOutput::Text(_)));

        let outputs = aggregator.ingest(complete());
        let TurnOutput::Completed(turn) = &outputs[0] else {
            panic!("expected completed turn");
        };
        assert_eq!(turn.audio.len(), 2);
        assert_eq!(turn.audio_duration(), Duration::from_millis(30));
        assert!(turn.complete && !turn.interrupted);
    }

    #[test]
    fn test_completion_in_same_frame_as_content() {
        let mut aggregator = TurnAggregator::new();
        let outputs = aggregator.ingest(ServerContent {
            parts: vec![Part::text("done")],
            turn_complete: true,
            ..ServerContent::default()
        });
        assert_eq!(outputs.len(), 2);
        assert_eq!(completed_text(&outputs), Some("done"));
    }

    #[test]
    fn test_bare_completions_emit_empty_turns() {
        let mut aggregator = TurnAggregator::new();
        for _ in 0..2 {
            let outputs = aggregator.ingest(complete());
            assert_eq!(completed_text(&outputs), Some(""));
        }
    }

    #[test]
    fn test_empty_frame_is_a_no_op() {
        let mut aggregator = TurnAggregator::new();
        assert!(aggregator.ingest(ServerContent::default()).is_empty());
        assert!(!aggregator.in_progress());
    }

    #[test]
    fn test_interruption_emits_exactly_one_interrupted_turn() {
        let mut aggregator = TurnAggregator::new();
        aggregator.ingest(ServerContent {
            parts: vec![Part::text("Let me"), audio(480), audio(480)],
            ..ServerContent::default()
        });

        let outputs = aggregator.ingest(interrupted());
        assert_eq!(outputs.len(), 1);
        let TurnOutput::Interrupted(turn) = &outputs[0] else {
            panic!("expected interrupted turn");
        };
        assert!(turn.interrupted && !turn.complete);
        assert_eq!(turn.text, "Let me");
        assert_eq!(turn.audio.len(), 2);
        assert!(!aggregator.in_progress());
    }

    #[test]
    fn test_interruption_without_active_turn_still_signals() {
        let mut aggregator = TurnAggregator::new();
        let outputs = aggregator.ingest(interrupted());
        assert!(matches!(
            outputs.as_slice(),
            [TurnOutput::Interrupted(turn)] if turn.text.is_empty() && turn.interrupted
        ));
    }

    #[test]
    fn test_interrupting_frame_drops_its_audio() {
        let mut aggregator = TurnAggregator::new();
        let outputs = aggregator.ingest(ServerContent {
            parts: vec![audio(480)],
            interrupted: true,
            turn_complete: true,
            ..ServerContent::default()
        });
        assert_eq!(outputs.len(), 1);
        assert!(matches!(outputs[0], TurnOutput::Interrupted(_)));
    }

    #[test]
    fn test_unplayable_audio_does_not_hide_an_interruption() {
        let wire = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}}]},"interrupted":true}}"#;
        let Ok(crate::protocol::Frame::ServerContent(content)) = crate::protocol::decode(wire)
        else {
            panic!("expected serverContent");
        };
        let mut aggregator = TurnAggregator::new();
        aggregator.ingest(text(&["Also"]));
        let outputs = aggregator.ingest(content);
        assert!(matches!(
            outputs.as_slice(),
            [TurnOutput::Interrupted(turn)] if turn.text == "Also"
        ));
    }
}
