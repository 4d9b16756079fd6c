//! Per-round state machine of the relay.
//!
//! | state                 | event             | next                            | emits         |
//! |-----------------------|-------------------|---------------------------------|---------------|
//! | Streaming             | text delta        | Streaming                       | content chunk |
//! | Streaming             | tool-call delta   | AccumulatingToolCall / Invoking | -             |
//! | AccumulatingToolCall  | text delta        | AccumulatingToolCall            | content chunk |
//! | AccumulatingToolCall  | tool-call delta   | AccumulatingToolCall / Invoking | -             |
//! | Streaming / Accum.    | completion `stop` | Finished                        | done          |
//! | Streaming / Accum.    | other completion  | unchanged                       | -             |
//! | InvokingTool/Finished | anything          | unchanged                       | -             |
//!
//! `InvokingTool` is terminal for a round: the driver runs the tool and opens a new round.

use tracing::{debug, warn};

use super::OutboundEvent;
use super::accumulator::{ReadyToolCall, ToolCallAccumulator};
use crate::llm::StreamEvent;

pub const FINISH_STOP: &str = "stop";

#[derive(Debug, Clone, PartialEq)]
pub enum RelayState {
    Streaming,
    AccumulatingToolCall(ToolCallAccumulator),
    InvokingTool(ReadyToolCall),
    Finished,
}

#[derive(Debug, PartialEq)]
pub struct Step {
    pub next: RelayState,
    pub emit: Option<OutboundEvent>,
}

impl Step {
    fn stay(next: RelayState) -> Self {
        Self { next, emit: None }
    }
}

impl RelayState {
    pub fn advance(self, event: StreamEvent) -> Step {
        if matches!(self, RelayState::InvokingTool(_) | RelayState::Finished) {
            debug!(?event, "event after round ended, ignoring");
            return Step::stay(self);
        }

        match event {
            StreamEvent::TextDelta(text) => {
                let emit = (!text.is_empty()).then_some(OutboundEvent::Streaming { content: text });
                Step { next: self, emit }
            }
            StreamEvent::Completion { finish_reason } if finish_reason == FINISH_STOP => Step {
                next: RelayState::Finished,
                emit: Some(OutboundEvent::Done),
            },
            StreamEvent::Completion { finish_reason } => {
                debug!(%finish_reason, "non-stop finish reason");
                Step::stay(self)
            }
            StreamEvent::ToolCallDelta {
                id,
                name,
                arguments,
            } => {
                let mut acc = match self {
                    RelayState::AccumulatingToolCall(acc) => acc,
                    _ => ToolCallAccumulator::default(),
                };
                if let Some(id) = id.as_deref().filter(|id| !id.is_empty()) {
                    if !acc.id().is_empty() && acc.id() != id {
                        // Only one call may be live; a new id abandons the previous one
                        warn!(
                            previous = acc.id(),
                            next = id,
                            discarded_bytes = acc.arguments().len(),
                            "tool call replaced before completion"
                        );
                        acc = ToolCallAccumulator::new(id);
                    } else {
                        acc.set_id(id);
                    }
                }
                acc.push(name.as_deref(), arguments.as_deref());
                match acc.try_complete() {
                    Some(call) => Step::stay(RelayState::InvokingTool(call)),
                    None => Step::stay(RelayState::AccumulatingToolCall(acc)),
                }
            }
        }
    }
}
