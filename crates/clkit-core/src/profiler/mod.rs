//! Event profiler.
//!
//! Queues are registered with a [`Profiler`]; [`Profiler::calc`] walks the
//! events collected on them, reads the device timestamps and builds a
//! [`Profile`]: per-event records, per-name aggregates and the pairwise
//! overlap between event names.

pub mod export;
mod overlap;

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::Write as _,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    time::{Duration, Instant},
};

pub use export::{ExportOptions, ExportRow, export_options, parse_export, set_export_options, write_rows};
use overlap::OverlapMatrix;

use crate::{
    error::{ClError, Result},
    event::Event,
    queue::Queue,
    types::*,
};

/* ───────────── sorting keys ────────────────────────────── */

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn apply(self, o: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => o,
            SortOrder::Desc => o.reverse(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggSort {
    Name,
    Time,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoSort {
    EventName,
    QueueName,
    TQueued,
    TSubmit,
    TStart,
    TEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstSort {
    Instant,
    Id,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlapSort {
    Name,
    Duration,
}

/* ───────────── profile data ────────────────────────────── */

/// Timestamps of one profiled event, in device ticks (nanoseconds).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// 1-based, in ingestion order.
    pub id: usize,
    pub name: String,
    pub queue: String,
    pub t_queued: u64,
    pub t_submit: u64,
    pub t_start: u64,
    pub t_end: u64,
}

impl EventRecord {
    pub fn duration(&self) -> u64 {
        self.t_end.saturating_sub(self.t_start)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub name: String,
    /// Summed durations of all events with this name.
    pub total: u64,
    /// Share of the total time of all events.
    pub relative: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstantKind {
    Start,
    End,
}

/// Start or end of one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventInstant {
    pub event_id: usize,
    pub name: String,
    pub queue: String,
    pub kind: InstantKind,
    pub time: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overlap {
    pub name1: String,
    pub name2: String,
    pub duration: u64,
}

/// Result of a profiling run.
#[derive(Clone, Debug)]
pub struct Profile {
    records: Vec<EventRecord>,
    names: Vec<String>,
    name_ids: HashMap<String, usize>,
    queues: Vec<String>,
    aggregates: Vec<Aggregate>,
    overlaps: OverlapMatrix,
    total: u64,
    effective: u64,
    t_start: u64,
    elapsed: Option<Duration>,
}

impl Profile {
    /// Builds a profile from records alone. Queue ids follow the order in
    /// which queue names first appear.
    pub fn from_records(records: Vec<EventRecord>) -> Result<Profile> {
        let mut queues: Vec<String> = Vec::new();
        for r in &records {
            if !queues.contains(&r.queue) {
                queues.push(r.queue.clone());
            }
        }
        Profile::build(queues, records, None)
    }

    fn build(queues: Vec<String>, records: Vec<EventRecord>, elapsed: Option<Duration>) -> Result<Profile> {
        let mut names: Vec<String> = Vec::new();
        let mut name_ids: HashMap<String, usize> = HashMap::new();
        let mut totals: Vec<u64> = Vec::new();
        for r in &records {
            let id = *name_ids.entry(r.name.clone()).or_insert_with(|| {
                names.push(r.name.clone());
                totals.push(0);
                names.len() - 1
            });
            totals[id] = totals[id]
                .checked_add(r.duration())
                .ok_or_else(|| ClError::Overflow(format!("aggregate time of '{}'", r.name)))?;
        }
        let total = totals
            .iter()
            .try_fold(0u64, |acc, &t| acc.checked_add(t))
            .ok_or_else(|| ClError::Overflow("total event time".into()))?;
        let aggregates = names
            .iter()
            .zip(&totals)
            .map(|(name, &t)| Aggregate {
                name: name.clone(),
                total: t,
                relative: if total == 0 { 0.0 } else { t as f64 / total as f64 },
            })
            .collect();

        let overlaps = overlap::compute(names.len(), records.iter().map(|r| (name_ids[&r.name], r.t_start, r.t_end)))?;
        let effective = total.saturating_sub(overlaps.total()?);
        let t_start = records.iter().map(|r| r.t_start).min().unwrap_or(0);

        Ok(Profile { records, names, name_ids, queues, aggregates, overlaps, total, effective, t_start, elapsed })
    }

    /// Sum of all event durations.
    pub fn duration(&self) -> u64 {
        self.total
    }

    /// Total time with overlaps between different names counted once.
    pub fn effective_duration(&self) -> u64 {
        self.effective
    }

    /// Earliest event start.
    pub fn t_start(&self) -> u64 {
        self.t_start
    }

    /// Host time measured between `Profiler::start` and `stop`.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Event names in order of first appearance; the index is the name id.
    pub fn unique_names(&self) -> &[String] {
        &self.names
    }

    pub fn queue_id(&self, queue: &str) -> Option<usize> {
        self.queues.iter().position(|q| q == queue)
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn aggregate(&self, name: &str) -> Option<&Aggregate> {
        self.name_ids.get(name).map(|&i| &self.aggregates[i])
    }

    /// Overlap between two names (0 for a name with itself).
    pub fn overlap(&self, a: &str, b: &str) -> Option<u64> {
        Some(self.overlaps.get(*self.name_ids.get(a)?, *self.name_ids.get(b)?))
    }

    pub fn aggregates(&self, by: AggSort, order: SortOrder) -> impl Iterator<Item = &Aggregate> {
        let mut v: Vec<&Aggregate> = self.aggregates.iter().collect();
        v.sort_by(|a, b| {
            let primary = match by {
                AggSort::Name => a.name.cmp(&b.name),
                AggSort::Time => a.total.cmp(&b.total),
            };
            order.apply(primary).then_with(|| a.name.cmp(&b.name))
        });
        v.into_iter()
    }

    pub fn records(&self, by: InfoSort, order: SortOrder) -> impl Iterator<Item = &EventRecord> {
        let mut v: Vec<&EventRecord> = self.records.iter().collect();
        v.sort_by(|a, b| {
            let primary = match by {
                InfoSort::EventName => a.name.cmp(&b.name),
                InfoSort::QueueName => a.queue.cmp(&b.queue),
                InfoSort::TQueued => a.t_queued.cmp(&b.t_queued),
                InfoSort::TSubmit => a.t_submit.cmp(&b.t_submit),
                InfoSort::TStart => a.t_start.cmp(&b.t_start),
                InfoSort::TEnd => a.t_end.cmp(&b.t_end),
            };
            order
                .apply(primary)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.queue.cmp(&b.queue))
                .then(a.id.cmp(&b.id))
        });
        v.into_iter()
    }

    /// Start and end instants of every event with a non-empty interval.
    pub fn instants(&self, by: InstSort, order: SortOrder) -> impl Iterator<Item = EventInstant> {
        let mut v: Vec<EventInstant> = self
            .records
            .iter()
            .filter(|r| r.t_end > r.t_start)
            .flat_map(|r| {
                [(InstantKind::Start, r.t_start), (InstantKind::End, r.t_end)].map(|(kind, time)| EventInstant {
                    event_id: r.id,
                    name: r.name.clone(),
                    queue: r.queue.clone(),
                    kind,
                    time,
                })
            })
            .collect();
        v.sort_by(|a, b| {
            let primary = match by {
                InstSort::Instant => a.time.cmp(&b.time),
                InstSort::Id => a.event_id.cmp(&b.event_id),
            };
            order
                .apply(primary)
                .then_with(|| a.name.cmp(&b.name))
                .then(a.event_id.cmp(&b.event_id))
                .then(a.kind.cmp(&b.kind))
        });
        v.into_iter()
    }

    /// Non-zero overlaps; `name1` is the name seen first.
    pub fn overlaps(&self, by: OverlapSort, order: SortOrder) -> impl Iterator<Item = Overlap> {
        let mut v: Vec<Overlap> = self
            .overlaps
            .entries()
            .map(|(a, b, duration)| Overlap { name1: self.names[a].clone(), name2: self.names[b].clone(), duration })
            .collect();
        v.sort_by(|a, b| {
            let names = || a.name1.cmp(&b.name1).then_with(|| a.name2.cmp(&b.name2));
            match by {
                OverlapSort::Name => order.apply(names()),
                OverlapSort::Duration => order.apply(a.duration.cmp(&b.duration)).then_with(names),
            }
        });
        v.into_iter()
    }

    /// Rows ordered by start, then event id.
    pub fn export_rows(&self, zero_start: bool) -> Vec<ExportRow> {
        let base = if zero_start { self.t_start } else { 0 };
        let mut sorted: Vec<&EventRecord> = self.records.iter().collect();
        sorted.sort_by_key(|r| (r.t_start, r.id));
        sorted
            .into_iter()
            .map(|r| ExportRow {
                queue_id: self.queue_id(&r.queue).unwrap_or(0),
                start: r.t_start - base,
                end: r.t_end.saturating_sub(base),
                name: r.name.clone(),
            })
            .collect()
    }

    /// Exports with the process-wide default options.
    pub fn export<W: Write>(&self, out: &mut W) -> Result<()> {
        self.export_with(out, &export_options())
    }

    pub fn export_with<W: Write>(&self, out: &mut W, opts: &ExportOptions) -> Result<()> {
        write_rows(&self.export_rows(opts.zero_start), opts, out)
    }

    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.export(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Human-readable tables of aggregate times and overlaps.
    pub fn summary(&self, agg: (AggSort, SortOrder), ovlp: (OverlapSort, SortOrder)) -> String {
        const RULE: &str = "   ------------------------------------------------------------------";
        let secs = |ns: u64| ns as f64 * 1e-9;
        let mut s = String::from("\n");

        // Writing to a String cannot fail.
        let _ = writeln!(s, " Aggregate times by event  :");
        let _ = writeln!(s, "{RULE}");
        let _ = writeln!(s, "   | Event name                     | Rel. time (%) | Abs. time (s) |");
        let _ = writeln!(s, "{RULE}");
        for a in self.aggregates(agg.0, agg.1) {
            let _ = writeln!(s, "   | {:<30.30} | {:>13.4} | {:>13.4e} |", a.name, a.relative * 100.0, secs(a.total));
        }
        let _ = writeln!(s, "{RULE}");
        if self.total > 0 {
            let _ = writeln!(s, "                                    |         Total | {:>13.4e} |", secs(self.total));
            let _ = writeln!(s, "                                    ---------------------------------");
        }

        let overlaps: Vec<Overlap> = self.overlaps(ovlp.0, ovlp.1).collect();
        if overlaps.is_empty() {
            let _ = writeln!(s, " Event overlaps            : None");
        } else {
            let _ = writeln!(s, " Event overlaps            :");
            let _ = writeln!(s, "{RULE}");
            let _ = writeln!(s, "   | Event 1                | Event 2                | Overlap (s)  |");
            let _ = writeln!(s, "{RULE}");
            for o in &overlaps {
                let _ = writeln!(s, "   | {:<22.22} | {:<22.22} | {:>12.4e} |", o.name1, o.name2, secs(o.duration));
            }
            let _ = writeln!(s, "{RULE}");
            let _ = writeln!(s, "                            |                  Total | {:>12.4e} |", secs(self.total - self.effective));
            let _ = writeln!(s, "                            -----------------------------------------");
            let _ = writeln!(s, " Tot. of all events (eff.) : {:e}s", secs(self.effective));
        }

        if let Some(elapsed) = self.elapsed.filter(|e| !e.is_zero()) {
            let wall = elapsed.as_secs_f64();
            let device = secs(self.effective) * 100.0 / wall;
            let _ = writeln!(s, " Total elapsed time        : {wall:e}s");
            let _ = writeln!(s, " Time spent in device      : {device:.2}%");
            let _ = writeln!(s, " Time spent in host        : {:.2}%", 100.0 - device);
        }
        s.push('\n');
        s
    }
}

/* ───────────── profiler ────────────────────────────────── */

#[derive(Default)]
pub struct Profiler {
    queues: Vec<(String, Queue)>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
    profile: Option<Profile>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `queue` under `name`. A name that is already taken is
    /// rebound to the new queue.
    pub fn add_queue(&mut self, name: impl Into<String>, queue: &Queue) {
        let name = name.into();
        if let Some(slot) = self.queues.iter_mut().find(|(n, _)| *n == name) {
            log::warn!("profiler queue '{name}' registered twice, keeping the latest");
            slot.1 = queue.clone();
        } else {
            self.queues.push((name, queue.clone()));
        }
    }

    pub fn num_queues(&self) -> usize {
        self.queues.len()
    }

    /// Starts the host timer.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.elapsed = None;
    }

    pub fn stop(&mut self) {
        if let Some(t) = self.started {
            self.elapsed = Some(t.elapsed());
        }
    }

    /// Host time since `start`, frozen by `stop`.
    pub fn time_elapsed(&self) -> Option<Duration> {
        self.elapsed.or_else(|| self.started.map(|t| t.elapsed()))
    }

    /// Ingests the events of every registered queue and computes the
    /// profile. Processed queues drop their events afterwards.
    pub fn calc(&mut self) -> Result<&Profile> {
        let mut records = Vec::new();
        for (qname, queue) in &self.queues {
            if queue.properties()? & CL_QUEUE_PROFILING_ENABLE == 0 {
                return Err(ClError::InvalidArgument(format!("queue '{qname}' does not have profiling enabled")));
            }
            for ev in queue.events() {
                if let Some((name, [t_queued, t_submit, t_start, t_end])) = ingest(&ev)? {
                    records.push(EventRecord {
                        id: records.len() + 1,
                        name,
                        queue: qname.clone(),
                        t_queued,
                        t_submit,
                        t_start,
                        t_end,
                    });
                }
            }
        }
        log::debug!("profiler: {} event(s) from {} queue(s)", records.len(), self.queues.len());

        let queues = self.queues.iter().map(|(n, _)| n.clone()).collect();
        let profile = Profile::build(queues, records, self.time_elapsed())?;
        for (_, q) in &self.queues {
            q.gc();
        }
        Ok(self.profile.insert(profile))
    }

    /// Profile of the last successful `calc`.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }
}

/// Name and `[queued, submit, start, end]` of a profilable event, `None`
/// for events without usable timestamps.
fn ingest(ev: &Event) -> Result<Option<(String, [u64; 4])>> {
    if ev.command_type()? == CL_COMMAND_USER {
        log::info!("profiler: skipping user event {:#x}", ev.handle().0);
        return Ok(None);
    }
    let mut times = [0u64; 4];
    let params = [CL_PROFILING_COMMAND_QUEUED, CL_PROFILING_COMMAND_SUBMIT, CL_PROFILING_COMMAND_START, CL_PROFILING_COMMAND_END];
    for (slot, param) in times.iter_mut().zip(params) {
        *slot = match ev.profiling_info(param) {
            Ok(t) => t,
            Err(e) if e.is_profiling_unavailable() => {
                log::info!("profiler: no profiling info for event {:#x}", ev.handle().0);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
    }
    if times.contains(&0) {
        log::info!("profiler: event {:#x} has missing timestamps", ev.handle().0);
        return Ok(None);
    }
    Ok(Some((ev.final_name()?, times)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: usize, name: &str, queue: &str, start: u64, end: u64) -> EventRecord {
        EventRecord { id, name: name.into(), queue: queue.into(), t_queued: start, t_submit: start, t_start: start, t_end: end }
    }

    #[test]
    fn aggregates_and_effective_time() {
        let p = Profile::from_records(vec![
            rec(1, "A", "q", 100, 200),
            rec(2, "B", "q", 150, 250),
            rec(3, "C", "q", 210, 260),
        ])
        .unwrap();
        assert_eq!(p.aggregate("A").unwrap().total, 100);
        assert_eq!(p.aggregate("C").unwrap().total, 50);
        assert_eq!(p.duration(), 250);
        assert_eq!(p.effective_duration(), 160);
        assert!((p.aggregate("B").unwrap().relative - 0.4).abs() < 1e-12);
        assert_eq!(p.overlap("A", "B"), Some(50));
        assert_eq!(p.overlap("C", "B"), Some(40));
        assert_eq!(p.overlap("A", "nope"), None);
    }

    #[test]
    fn effective_time_saturates() {
        // Seven names over one interval: 21 pairwise overlaps of 10 each
        // exceed the 70 summed.
        let p = Profile::from_records(
            ["a", "b", "c", "d", "e", "f", "g"].iter().enumerate().map(|(i, n)| rec(i + 1, n, "q", 0, 10)).collect(),
        )
        .unwrap();
        assert_eq!(p.duration(), 70);
        assert_eq!(p.effective_duration(), 0);
    }

    #[test]
    fn descending_sort_keeps_ties_ascending() {
        let p = Profile::from_records(vec![
            rec(1, "b", "q", 0, 10),
            rec(2, "a", "q", 5, 15),
            rec(3, "c", "q", 20, 25),
        ])
        .unwrap();
        let by_time: Vec<&str> = p.aggregates(AggSort::Time, SortOrder::Desc).map(|a| a.name.as_str()).collect();
        assert_eq!(by_time, ["a", "b", "c"]);
        let by_end: Vec<usize> = p.records(InfoSort::TEnd, SortOrder::Desc).map(|r| r.id).collect();
        assert_eq!(by_end, [3, 2, 1]);
    }

    #[test]
    fn instants_skip_empty_intervals() {
        let p = Profile::from_records(vec![rec(1, "x", "q", 10, 10), rec(2, "y", "q", 5, 20)]).unwrap();
        let inst: Vec<(usize, InstantKind, u64)> =
            p.instants(InstSort::Instant, SortOrder::Asc).map(|i| (i.event_id, i.kind, i.time)).collect();
        assert_eq!(inst, [(2, InstantKind::Start, 5), (2, InstantKind::End, 20)]);
    }

    #[test]
    fn empty_profile() {
        let p = Profile::from_records(Vec::new()).unwrap();
        assert_eq!(p.duration(), 0);
        assert_eq!(p.t_start(), 0);
        assert_eq!(p.overlaps(OverlapSort::Name, SortOrder::Asc).count(), 0);
        assert!(p.summary((AggSort::Time, SortOrder::Desc), (OverlapSort::Duration, SortOrder::Desc)).contains("None"));
    }
}
