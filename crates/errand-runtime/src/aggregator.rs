//! [`UpdateAggregator`] – coalesces world updates into one report per plan.
//!
//! Outside a batch window every [`UpdateRecord`] is shown immediately as its
//! own line.  Inside a window records are keyed by `(type, subject)`; a later
//! record replaces an earlier one in place, so the flushed report lists each
//! key once, in order of first insertion, with its latest value.
//!
//! Independently of batching the aggregator keeps the full in-memory update
//! history and the last known robot position, placed-object positions, door
//! states and switch states.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use errand_middleware::{EventBus, ReportSink, Topic};
use errand_types::{EventPayload, Severity, UpdateKind, UpdateRecord};
use tracing::debug;

const SOURCE: &str = "errand-runtime::aggregator";

#[derive(Default)]
struct Batch {
    records: Vec<UpdateRecord>,
    index: HashMap<String, usize>,
}

impl Batch {
    fn upsert(&mut self, record: UpdateRecord) {
        let key = record.key();
        match self.index.get(&key) {
            Some(&slot) => self.records[slot] = record,
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }
}

#[derive(Default)]
struct State {
    batch: Option<Batch>,
    history: Vec<UpdateRecord>,
    robot_position: Option<[f32; 3]>,
    placed: HashMap<String, [f32; 3]>,
    doors: HashMap<String, bool>,
    switches: HashMap<String, bool>,
}

/// Cheap to clone; clones share the same window and history.
#[derive(Clone)]
pub struct UpdateAggregator {
    sink: Arc<dyn ReportSink>,
    bus: Option<EventBus>,
    state: Arc<Mutex<State>>,
}

impl UpdateAggregator {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            bus: None,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Also publish every record on [`Topic::WorldUpdates`].
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a collecting window.  A window that is already open stays as is.
    pub fn begin_batch(&self) {
        let mut state = self.lock();
        if state.batch.is_none() {
            debug!("batch window opened");
            state.batch = Some(Batch::default());
        }
    }

    pub fn is_batching(&self) -> bool {
        self.lock().batch.is_some()
    }

    /// Record one world mutation.
    pub fn record(&self, record: UpdateRecord) {
        let immediate = {
            let mut state = self.lock();
            state.history.push(record.clone());
            let subject = record.subject.to_lowercase();
            match (record.kind, record.position, record.state) {
                (UpdateKind::Move, Some(pos), _) => state.robot_position = Some(pos),
                (UpdateKind::Place, Some(pos), _) => {
                    state.placed.insert(subject, pos);
                }
                (UpdateKind::Open, _, Some(open)) => {
                    state.doors.insert(subject, open);
                }
                (UpdateKind::Switch, _, Some(on)) => {
                    state.switches.insert(subject, on);
                }
                _ => {}
            }
            match state.batch.as_mut() {
                Some(batch) => {
                    batch.upsert(record.clone());
                    false
                }
                None => true,
            }
        };

        if let Some(bus) = &self.bus {
            bus.emit(Topic::WorldUpdates, SOURCE, EventPayload::WorldUpdate(record.clone()));
        }
        if immediate {
            self.sink.show_message(&record.to_string(), Severity::Info);
        }
    }

    /// Close the window and show its records as one report.
    ///
    /// Returns `None` (and shows nothing) when no window is open.  An open
    /// but empty window closes silently and yields `Some(vec![])`.
    pub fn end_batch_and_flush(&self) -> Option<Vec<UpdateRecord>> {
        let batch = self.lock().batch.take()?;
        debug!(records = batch.records.len(), "batch window flushed");
        if !batch.records.is_empty() {
            let report = batch
                .records
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            self.sink.show_message(&report, Severity::Info);
        }
        Some(batch.records)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Every record ever passed to [`record`](Self::record), oldest first.
    pub fn history(&self) -> Vec<UpdateRecord> {
        self.lock().history.clone()
    }

    pub fn last_robot_position(&self) -> Option<[f32; 3]> {
        self.lock().robot_position
    }

    pub fn placed_position(&self, object: &str) -> Option<[f32; 3]> {
        self.lock().placed.get(&object.to_lowercase()).copied()
    }

    pub fn door_state(&self, door: &str) -> Option<bool> {
        self.lock().doors.get(&door.to_lowercase()).copied()
    }

    pub fn switch_state(&self, switch: &str) -> Option<bool> {
        self.lock().switches.get(&switch.to_lowercase()).copied()
    }

    /// Last known world state as report lines, sorted for stable output.
    pub fn summary(&self) -> Vec<String> {
        let state = self.lock();
        let mut lines = Vec::new();
        if let Some(pos) = state.robot_position {
            lines.push(UpdateRecord::moved("robot", pos).to_string());
        }
        let mut placed: Vec<_> = state.placed.iter().collect();
        placed.sort_by(|a, b| a.0.cmp(b.0));
        lines.extend(placed.into_iter().map(|(k, p)| UpdateRecord::placed(k.as_str(), *p).to_string()));
        let mut doors: Vec<_> = state.doors.iter().collect();
        doors.sort_by(|a, b| a.0.cmp(b.0));
        lines.extend(doors.into_iter().map(|(k, s)| UpdateRecord::opened(k.as_str(), *s).to_string()));
        let mut switches: Vec<_> = state.switches.iter().collect();
        switches.sort_by(|a, b| a.0.cmp(b.0));
        lines.extend(
            switches
                .into_iter()
                .map(|(k, s)| UpdateRecord::switched(k.as_str(), *s).to_string()),
        );
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errand_middleware::MemorySink;

    fn aggregator() -> (UpdateAggregator, MemorySink) {
        let sink = MemorySink::new();
        (UpdateAggregator::new(Arc::new(sink.clone())), sink)
    }

    #[test]
    fn unbatched_records_are_shown_immediately() {
        let (agg, sink) = aggregator();
        agg.record(UpdateRecord::switched("lamp_02", true));
        agg.record(UpdateRecord::switched("lamp_02", false));
        assert_eq!(
            sink.texts(),
            vec!["switch:lamp_02 state=ON", "switch:lamp_02 state=OFF"]
        );
    }

    #[test]
    fn same_key_in_batch_collapses_to_last_write() {
        let (agg, sink) = aggregator();
        agg.begin_batch();
        agg.record(UpdateRecord::switched("lamp_02", true));
        agg.record(UpdateRecord::switched("lamp_02", false));
        assert!(sink.texts().is_empty());

        let flushed = agg.end_batch_and_flush().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].state, Some(false));
        assert_eq!(sink.texts(), vec!["switch:lamp_02 state=OFF"]);
    }

    #[test]
    fn flush_keeps_first_insertion_order() {
        let (agg, sink) = aggregator();
        agg.begin_batch();
        agg.record(UpdateRecord::moved("robot", [1.0, 0.0, 0.0]));
        agg.record(UpdateRecord::placed("laptop", [3.0, 0.84, 0.0]));
        agg.record(UpdateRecord::moved("Robot", [2.0, 0.0, 0.5]));
        agg.end_batch_and_flush();
        assert_eq!(
            sink.texts(),
            vec!["move:Robot pos=(2.00,0.00,0.50)\nplace:laptop pos=(3.00,0.84,0.00)"]
        );
    }

    #[test]
    fn flush_without_window_is_a_no_op() {
        let (agg, sink) = aggregator();
        assert!(agg.end_batch_and_flush().is_none());
        agg.begin_batch();
        assert_eq!(agg.end_batch_and_flush(), Some(vec![]));
        assert!(agg.end_batch_and_flush().is_none());
        assert!(sink.texts().is_empty());
    }

    #[test]
    fn window_does_not_leak_into_next_batch() {
        let (agg, sink) = aggregator();
        agg.begin_batch();
        agg.record(UpdateRecord::opened("door_03", true));
        agg.end_batch_and_flush();
        agg.begin_batch();
        agg.record(UpdateRecord::switched("lamp_02", true));
        agg.end_batch_and_flush();
        assert_eq!(sink.texts(), vec!["open:door_03 state=OPEN", "switch:lamp_02 state=ON"]);
    }

    #[test]
    fn last_known_state_is_case_insensitive() {
        let (agg, _) = aggregator();
        agg.record(UpdateRecord::opened("Door_03", true));
        agg.record(UpdateRecord::switched("LAMP_02", true));
        agg.record(UpdateRecord::placed("Laptop", [1.0, 2.0, 3.0]));
        agg.record(UpdateRecord::moved("robot", [4.0, 0.0, 1.0]));
        assert_eq!(agg.door_state("door_03"), Some(true));
        assert_eq!(agg.switch_state("lamp_02"), Some(true));
        assert_eq!(agg.placed_position("LAPTOP"), Some([1.0, 2.0, 3.0]));
        assert_eq!(agg.last_robot_position(), Some([4.0, 0.0, 1.0]));
        assert_eq!(agg.history().len(), 4);
        assert_eq!(agg.summary().len(), 4);
    }

    #[test]
    fn records_are_published_on_the_bus() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::WorldUpdates);
        let agg = UpdateAggregator::new(Arc::new(MemorySink::new())).with_bus(bus);
        agg.begin_batch();
        agg.record(UpdateRecord::opened("door_03", true));
        let events = rx.drain();
        assert!(matches!(&events[..], [e] if matches!(&e.payload, EventPayload::WorldUpdate(r) if r.subject == "door_03")));
    }
}
