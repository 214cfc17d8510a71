//! Various event sinks for different use cases

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use log::{error, info};

use crate::tw_interface::{Decision, Event, EventSink, NoActionReason, NodeId, Round};
use crate::tw_stats::EventCounts;

/// Shared sinks, so a caller can keep a handle and inspect it after the run
impl<S: EventSink> EventSink for Rc<RefCell<S>> {
    fn log(&mut self, round: Round, event: Event) {
        self.borrow_mut().log(round, event);
    }
}

// ============================================================================
// Console Logging Sink
// ============================================================================

/// Renders events as the classic one-line server log through `log::info!`
pub struct ConsoleEventSink {
    enabled: bool,
}

impl ConsoleEventSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn render(event: &Event) -> String {
        match event {
            Event::RoundStarted { chosen } => format!("CHOSEN SERVERS: {:?}", chosen),
            Event::Sent { from, to } => {
                format!("Server [{}] SENT a message to Server[{}]", from, to)
            }
            Event::Received { by, from } => {
                format!("Server [{}] RECEIVED a message from Server[{}]", by, from)
            }
            Event::WakeupSent { from, to } => {
                format!("Server [{}] SENT a WAKEUP to Server[{}]", from, to)
            }
            Event::WakeupReceived { by, from } => {
                format!("Server [{}] RECEIVED a WAKEUP from Server[{}]", by, from)
            }
            Event::Decided { node, decision } => match decision {
                Decision::Terminated => format!("Server [{}] DECIDE", node),
                _ => format!("Server [{}] DECIDE {}", node, decision.as_str()),
            },
            Event::NoAction { node, reason } => match reason {
                NoActionReason::Sleeping => format!("Server [{}] is SLEEPING", node),
                NoActionReason::AwaitingWakeups => {
                    format!("Server [{}] is WAITING for WAKEUPS", node)
                }
                NoActionReason::WaitingForSilent => {
                    format!("Server [{}] is WAITING to find SILENT NEIGHBOUR", node)
                }
                NoActionReason::Idle => format!("Server [{}] NO ACTION", node),
            },
        }
    }
}

impl EventSink for ConsoleEventSink {
    fn log(&mut self, round: Round, event: Event) {
        if !self.enabled {
            return;
        }
        if let Event::RoundStarted { .. } = event {
            info!("ROUND {}", round);
        }
        info!("{}", Self::render(&event));
    }
}

// ============================================================================
// CSV Event Sink
// ============================================================================

/// CSV event sink for structured data export
pub struct CsvEventSink {
    writer: BufWriter<File>,
}

impl CsvEventSink {
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "round,event_type,node,peer,details")?;

        Ok(Self { writer })
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    fn write_event(&mut self, round: Round, event: &Event) -> std::io::Result<()> {
        match event {
            Event::RoundStarted { chosen } => {
                let chosen: Vec<String> = chosen.iter().map(|id| id.to_string()).collect();
                writeln!(self.writer, "{},RoundStarted,,,{}", round, chosen.join(" "))
            }
            Event::Sent { from, to } => writeln!(self.writer, "{},Sent,{},{},", round, from, to),
            Event::Received { by, from } => {
                writeln!(self.writer, "{},Received,{},{},", round, by, from)
            }
            Event::WakeupSent { from, to } => {
                writeln!(self.writer, "{},WakeupSent,{},{},", round, from, to)
            }
            Event::WakeupReceived { by, from } => {
                writeln!(self.writer, "{},WakeupReceived,{},{},", round, by, from)
            }
            Event::Decided { node, decision } => writeln!(
                self.writer,
                "{},Decided,{},,{}",
                round,
                node,
                decision.as_str()
            ),
            Event::NoAction { node, reason } => {
                writeln!(self.writer, "{},NoAction,{},,{:?}", round, node, reason)
            }
        }
    }
}

impl EventSink for CsvEventSink {
    fn log(&mut self, round: Round, event: Event) {
        if let Err(e) = self.write_event(round, &event) {
            error!("Error writing to CSV: {}", e);
        }
    }
}

impl Drop for CsvEventSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

// ============================================================================
// Collector Event Sink (In-Memory)
// ============================================================================

/// Collects events in memory for programmatic analysis
#[derive(Default)]
pub struct CollectorEventSink {
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub round: Round,
    pub event: Event,
}

impl EventRecord {
    /// The node the event happened at
    pub fn node(&self) -> Option<NodeId> {
        match &self.event {
            Event::RoundStarted { .. } => None,
            Event::Sent { from, .. } | Event::WakeupSent { from, .. } => Some(*from),
            Event::Received { by, .. } | Event::WakeupReceived { by, .. } => Some(*by),
            Event::Decided { node, .. } | Event::NoAction { node, .. } => Some(*node),
        }
    }
}

impl CollectorEventSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    // Query helpers
    pub fn decisions(&self) -> impl Iterator<Item = &EventRecord> {
        self.events
            .iter()
            .filter(|e| matches!(e.event, Event::Decided { .. }))
    }

    pub fn for_node(&self, node: NodeId) -> impl Iterator<Item = &EventRecord> {
        self.events.iter().filter(move |e| e.node() == Some(node))
    }

    pub fn in_round_range(&self, start: Round, end: Round) -> impl Iterator<Item = &EventRecord> {
        self.events
            .iter()
            .filter(move |e| e.round >= start && e.round <= end)
    }

    /// Rounds forwarded to this sink
    pub fn count_rounds(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.event, Event::RoundStarted { .. }))
            .count()
    }

    pub fn count_sent(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.event, Event::Sent { .. }))
            .count()
    }

    pub fn count_no_actions(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.event, Event::NoAction { .. }))
            .count()
    }

    /// Round in which `node` decided, if it did
    pub fn decided_in(&self, node: NodeId) -> Option<Round> {
        self.decisions()
            .find(|e| e.node() == Some(node))
            .map(|e| e.round)
    }

    pub fn count_by_type(&self) -> EventCounts {
        let mut counts = EventCounts::default();
        let mut active = BTreeSet::new();
        for record in &self.events {
            counts.record(&record.event);
            if record.event.changes_state() {
                active.insert(record.round);
            }
        }
        counts.active_rounds = active.len();
        counts
    }

    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut csv_sink = CsvEventSink::new(path)?;
        for record in &self.events {
            csv_sink.write_event(record.round, &record.event)?;
        }
        csv_sink.flush()
    }
}

impl EventSink for CollectorEventSink {
    fn log(&mut self, round: Round, event: Event) {
        self.events.push(EventRecord { round, event });
    }
}

// ============================================================================
// Multi Sink (Combine Multiple Sinks)
// ============================================================================

/// Combines multiple event sinks
#[derive(Default)]
pub struct MultiEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl MultiEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for MultiEventSink {
    fn log(&mut self, round: Round, event: Event) {
        for sink in &mut self.sinks {
            sink.log(round, event.clone());
        }
    }
}
