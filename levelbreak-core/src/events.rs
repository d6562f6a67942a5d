//! Pipeline events for presentation collaborators (charts, dashboards).
//!
//! The core only emits events; subscribers decide how to render them.

use serde::{Deserialize, Serialize};

use crate::confirmation::{BreakoutType, ConfirmationOutcome};
use crate::domain::Side;
use crate::exit::ExitType;
use crate::levels::KeyLevel;
use crate::orchestrator::ContextKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    LevelsChanged {
        levels: Vec<KeyLevel>,
    },
    BreakoutStarted {
        level: f64,
        breakout_type: BreakoutType,
        price: f64,
    },
    BreakoutResolved {
        level: f64,
        breakout_type: BreakoutType,
        outcome: ConfirmationOutcome,
        score: f64,
    },
    PositionOpened {
        ticket: u64,
        side: Side,
        entry: f64,
        stop: f64,
        target: f64,
        lots: f64,
    },
    StopModified {
        ticket: u64,
        stop: f64,
    },
    PartialClose {
        ticket: u64,
        volume_fraction: f64,
        price: f64,
    },
    PositionClosed {
        ticket: u64,
        exit_type: ExitType,
        price: f64,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::LevelsChanged { .. } => "levels_changed",
            PipelineEvent::BreakoutStarted { .. } => "breakout_started",
            PipelineEvent::BreakoutResolved { .. } => "breakout_resolved",
            PipelineEvent::PositionOpened { .. } => "position_opened",
            PipelineEvent::StopModified { .. } => "stop_modified",
            PipelineEvent::PartialClose { .. } => "partial_close",
            PipelineEvent::PositionClosed { .. } => "position_closed",
        }
    }
}

/// Subscriber to pipeline events.
pub trait EventSink {
    fn on_event(&mut self, key: &ContextKey, event: &PipelineEvent);
}

/// Records every event it receives.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<(ContextKey, PipelineEvent)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|(_, e)| e.name() == name).count()
    }
}

impl EventSink for EventLog {
    fn on_event(&mut self, key: &ContextKey, event: &PipelineEvent) {
        self.events.push((key.clone(), event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = PipelineEvent::StopModified {
            ticket: 3,
            stop: 1.1002,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"stop_modified""#));

        let mut log = EventLog::new();
        log.on_event(&ContextKey::new("EURUSD", Timeframe::H1), &event);
        assert_eq!(log.count("stop_modified"), 1);
    }
}
