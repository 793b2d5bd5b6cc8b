use std::sync::Arc;

use clkit_core::{
    ClError, Context, Driver, Event, Profile, Profiler, Queue, StubDriver,
    profiler::{
        AggSort, ExportOptions, InfoSort, InstSort, InstantKind, OverlapSort, SortOrder, parse_export, write_rows,
    },
    types::*,
};

struct Fixture {
    stub: Arc<StubDriver>,
    ctx: Context,
}

fn fixture() -> Fixture {
    let stub = StubDriver::single_gpu();
    let driver: Arc<dyn Driver> = stub.clone();
    let ctx = Context::new_gpu(&driver).unwrap();
    Fixture { stub, ctx }
}

impl Fixture {
    fn queue(&self) -> Queue {
        Queue::new(&self.ctx, None, CL_QUEUE_PROFILING_ENABLE).unwrap()
    }

    /// Marker on `queue` named `name`, running over `[start, end]`.
    fn timed(&self, queue: &Queue, name: &str, start: u64, end: u64) -> Event {
        let ev = queue.enqueue_marker(None).unwrap();
        ev.set_name(name);
        self.stub.set_event_times(ev.handle(), start - 2, start - 1, start, end);
        ev
    }
}

#[test]
fn overlaps_aggregates_and_effective_time() {
    let f = fixture();
    let q = f.queue();
    f.timed(&q, "A", 100, 200);
    f.timed(&q, "B", 150, 250);
    f.timed(&q, "C", 210, 260);

    let mut prof = Profiler::new();
    prof.add_queue("main", &q);
    let p = prof.calc().unwrap();

    assert_eq!(p.overlap("A", "B"), Some(50));
    assert_eq!(p.overlap("B", "C"), Some(40));
    assert_eq!(p.overlap("A", "C"), Some(0));
    assert_eq!(p.overlap("C", "B"), Some(40));
    assert_eq!(p.overlap("A", "missing"), None);

    assert_eq!(p.aggregate("A").unwrap().total, 100);
    assert_eq!(p.aggregate("B").unwrap().total, 100);
    assert_eq!(p.aggregate("C").unwrap().total, 50);
    assert!((p.aggregate("C").unwrap().relative - 0.2).abs() < 1e-12);
    assert_eq!(p.duration(), 250);
    assert_eq!(p.effective_duration(), 160);
    assert_eq!(p.t_start(), 100);

    let by_time: Vec<&str> = p.aggregates(AggSort::Time, SortOrder::Desc).map(|a| a.name.as_str()).collect();
    assert_eq!(by_time, vec!["A", "B", "C"]);
    let by_duration: Vec<(String, String, u64)> =
        p.overlaps(OverlapSort::Duration, SortOrder::Desc).map(|o| (o.name1, o.name2, o.duration)).collect();
    assert_eq!(by_duration, vec![("A".into(), "B".into(), 50), ("B".into(), "C".into(), 40)]);
}

#[test]
fn zero_start_export_over_two_queues() {
    let f = fixture();
    let q0 = f.queue();
    let q1 = f.queue();
    f.timed(&q0, "load", 1000, 1100);
    f.timed(&q1, "run", 1050, 1200);

    let mut prof = Profiler::new();
    prof.add_queue("io", &q0);
    prof.add_queue("compute", &q1);
    let p = prof.calc().unwrap();
    assert_eq!(p.queue_id("compute"), Some(1));

    let mut out = Vec::new();
    p.export_with(&mut out, &ExportOptions::default()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "0\t0\t100\tload\n1\t50\t200\trun\n");

    let absolute = ExportOptions { zero_start: false, ..ExportOptions::default() };
    let mut out = Vec::new();
    p.export_with(&mut out, &absolute).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "0\t1000\t1100\tload\n1\t1050\t1200\trun\n");
}

#[test]
fn export_parse_reexport_is_stable() {
    let records = vec![
        rec(1, "write", "q0", 40, 90),
        rec(2, "kernel", "q1", 10, 60),
        rec(3, "read", "q0", 60, 70),
    ];
    let p = Profile::from_records(records).unwrap();
    let opts = ExportOptions { separator: ",".into(), evname_delim: "\"".into(), ..ExportOptions::default() };
    let mut first = Vec::new();
    p.export_with(&mut first, &opts).unwrap();
    let text = String::from_utf8(first).unwrap();
    assert_eq!(text, "1,0,50,\"kernel\"\n0,30,80,\"write\"\n0,50,60,\"read\"\n");

    let rows = parse_export(&text, &opts).unwrap();
    assert!(rows.windows(2).all(|w| w[0].start <= w[1].start));
    assert_eq!(rows.iter().map(|r| r.start).min(), Some(0));

    let mut second = Vec::new();
    write_rows(&rows, &opts, &mut second).unwrap();
    assert_eq!(String::from_utf8(second).unwrap(), text);
}

fn rec(id: usize, name: &str, queue: &str, start: u64, end: u64) -> clkit_core::profiler::EventRecord {
    clkit_core::profiler::EventRecord {
        id,
        name: name.into(),
        queue: queue.into(),
        t_queued: start,
        t_submit: start,
        t_start: start,
        t_end: end,
    }
}

#[test]
fn queue_without_profiling_is_rejected() {
    let f = fixture();
    let plain = Queue::new(&f.ctx, None, 0).unwrap();
    plain.enqueue_marker(None).unwrap();
    let mut prof = Profiler::new();
    prof.add_queue("plain", &plain);
    assert!(matches!(prof.calc(), Err(ClError::InvalidArgument(_))));
    assert!(prof.profile().is_none());
    assert_eq!(plain.num_events(), 1);
}

#[test]
fn events_without_timestamps_are_skipped() {
    let f = fixture();
    let q = f.queue();
    f.timed(&q, "good", 500, 600);
    let bad = q.enqueue_marker(None).unwrap();
    f.stub.set_event_times(bad.handle(), 0, 0, 0, 0);

    let mut prof = Profiler::new();
    prof.add_queue("q", &q);
    let p = prof.calc().unwrap();
    assert_eq!(p.num_records(), 1);
    assert_eq!(p.unique_names(), ["good".to_owned()]);
}

#[test]
fn calc_releases_processed_events() {
    let f = fixture();
    let q = f.queue();
    let h = f.timed(&q, "once", 10, 20).handle();
    assert_eq!(q.num_events(), 1);

    let mut prof = Profiler::new();
    prof.add_queue("q", &q);
    prof.calc().unwrap();
    assert_eq!(q.num_events(), 0);
    assert!(!f.stub.is_live(h));

    // A second run sees nothing new.
    assert_eq!(prof.calc().unwrap().num_records(), 0);
}

#[test]
fn unnamed_events_use_command_names() {
    let f = fixture();
    let q = f.queue();
    let ev = q.enqueue_barrier(None).unwrap();
    f.stub.set_event_times(ev.handle(), 1, 2, 3, 9);
    drop(ev);

    let mut prof = Profiler::new();
    prof.add_queue("q", &q);
    let p = prof.calc().unwrap();
    assert_eq!(p.aggregate("BARRIER").map(|a| a.total), Some(6));
}

#[test]
fn duplicate_queue_name_rebinds() {
    let f = fixture();
    let q0 = f.queue();
    let q1 = f.queue();
    f.timed(&q0, "old", 10, 20);
    f.timed(&q1, "new", 10, 30);

    let mut prof = Profiler::new();
    prof.add_queue("q", &q0);
    prof.add_queue("q", &q1);
    assert_eq!(prof.num_queues(), 1);
    let p = prof.calc().unwrap();
    assert_eq!(p.unique_names(), ["new".to_owned()]);
    assert_eq!(q0.num_events(), 1);
}

#[test]
fn sorted_records_and_instants() {
    let p = Profile::from_records(vec![rec(1, "b", "q", 30, 40), rec(2, "a", "q", 10, 50), rec(3, "c", "q", 20, 20)]).unwrap();

    let starts: Vec<usize> = p.records(InfoSort::TStart, SortOrder::Asc).map(|r| r.id).collect();
    assert_eq!(starts, vec![2, 3, 1]);
    let ends: Vec<usize> = p.records(InfoSort::TEnd, SortOrder::Desc).map(|r| r.id).collect();
    assert_eq!(ends, vec![2, 1, 3]);

    let instants: Vec<(usize, InstantKind, u64)> =
        p.instants(InstSort::Instant, SortOrder::Asc).map(|i| (i.event_id, i.kind, i.time)).collect();
    assert_eq!(
        instants,
        vec![(2, InstantKind::Start, 10), (1, InstantKind::Start, 30), (1, InstantKind::End, 40), (2, InstantKind::End, 50)]
    );
}

#[test]
fn summary_and_file_export() {
    let f = fixture();
    let q = f.queue();
    f.timed(&q, "upload", 100, 300);
    f.timed(&q, "compute", 200, 400);

    let mut prof = Profiler::new();
    prof.add_queue("q", &q);
    prof.start();
    prof.stop();
    assert!(prof.time_elapsed().is_some());
    let p = prof.calc().unwrap();

    let s = p.summary((AggSort::Time, SortOrder::Desc), (OverlapSort::Duration, SortOrder::Desc));
    assert!(s.contains("Aggregate times by event"));
    assert!(s.contains("| upload"));
    assert!(s.contains("| compute"));
    assert!(s.contains("Event overlaps            :\n"));

    let path = std::env::temp_dir().join(format!("clkit-profile-{}.tsv", std::process::id()));
    p.export_to_file(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn summed_durations_past_u64_overflow() {
    let same = Profile::from_records(vec![rec(1, "a", "q", 1, u64::MAX), rec(2, "a", "q", 1, u64::MAX)]);
    assert!(matches!(same, Err(ClError::Overflow(_))));

    let distinct = Profile::from_records(vec![rec(1, "a", "q", 1, u64::MAX), rec(2, "b", "q", 1, u64::MAX)]);
    assert!(matches!(distinct, Err(ClError::Overflow(_))));
}
