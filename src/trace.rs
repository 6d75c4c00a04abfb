//! Chrome Trace Event emission (spec.md §4.7 "Trace emission", §6
//! `build-<label>.trace`).
//!
//! Drains every timer the Scheduler and Runners populated over the course
//! of a run into one flat `traceEvents` array: `parser-to-pickler` and
//! `pickle-export` per project, `compile-<i>` per group, `javac` per
//! project with secondary sources. Events with zero (or unrecorded)
//! duration are omitted, per spec.md §4.7.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::thread::ThreadId;
use std::time::Instant;

use serde::Serialize;

use crate::error::Result;
use crate::project::Project;
use crate::timer::Timer;

#[derive(Debug, Serialize)]
struct TraceEvent {
    name: String,
    cat: String,
    ph: &'static str,
    ts: f64,
    dur: f64,
    pid: u32,
    tid: u64,
}

struct TraceBuilder {
    build_start: Instant,
    thread_ids: HashMap<ThreadId, u64>,
    next_tid: u64,
    events: Vec<TraceEvent>,
}

impl TraceBuilder {
    fn new(build_start: Instant) -> Self {
        Self { build_start, thread_ids: HashMap::new(), next_tid: 0, events: Vec::new() }
    }

    fn tid_for(&mut self, id: ThreadId) -> u64 {
        if let Some(&tid) = self.thread_ids.get(&id) {
            return tid;
        }
        let tid = self.next_tid;
        self.next_tid += 1;
        self.thread_ids.insert(id, tid);
        tid
    }

    fn push(&mut self, label: &str, name: &str, timer: &Timer) {
        if !timer.is_started() || !timer.is_stopped() {
            return;
        }
        let dur = timer.duration_us();
        if dur <= 0.0 {
            return;
        }
        let Some(start) = timer.start_instant() else { return };
        let Some(stopped_by) = timer.stopped_by() else { return };
        let ts = start.saturating_duration_since(self.build_start).as_secs_f64() * 1_000_000.0;
        let tid = self.tid_for(stopped_by);
        self.events.push(TraceEvent { name: name.to_string(), cat: label.to_string(), ph: "X", ts, dur, pid: 0, tid });
    }
}

/// Writes the Chrome Trace Event JSON document for this run to `path`.
/// Takes an iterator rather than `&[Project]` so callers holding projects
/// behind `Arc` (the Scheduler, sharing them with spawned tasks) can pass
/// `projects.iter().map(Arc::as_ref)` without collecting an owned copy.
pub fn write_trace<'a>(
    path: &Path,
    build_start: Instant,
    projects: impl IntoIterator<Item = &'a Project>,
) -> Result<()> {
    let mut builder = TraceBuilder::new(build_start);

    for project in projects {
        builder.push(&project.label, "parser-to-pickler", &project.outline_timer.lock().unwrap());
        builder.push(&project.label, "pickle-export", &project.pickle_export_timer.lock().unwrap());
        for group in &project.groups {
            builder.push(&project.label, &format!("compile-{}", group.id), &group.timer.lock().unwrap());
        }
        if project.has_secondary_sources() {
            builder.push(&project.label, "javac", &project.java_timer.lock().unwrap());
        }
    }

    let doc = serde_json::json!({ "traceEvents": builder.events });
    fs::write(path, serde_json::to_vec_pretty(&doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilers::CompilerSettings;
    use crate::project::Group;
    use std::path::PathBuf;

    #[test]
    fn empty_projects_produce_valid_empty_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build-test.trace");
        write_trace(&path, Instant::now(), &[] as &[Project]).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["traceEvents"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn completed_timers_produce_events_with_nonnegative_duration() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CompilerSettings { output_dir: PathBuf::from("out"), classpath: vec![], extra_args: vec![] };
        let project = Project::new(
            "a".into(),
            PathBuf::from("a.args"),
            PathBuf::from("out"),
            vec![PathBuf::from("A.src")],
            vec![],
            vec![],
            vec![],
            settings,
            vec![Group::new(0, vec![PathBuf::from("A.src")])],
        );
        let start = Instant::now();
        project.outline_timer.lock().unwrap().start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        project.outline_timer.lock().unwrap().stop().unwrap();

        let path = dir.path().join("build-a.trace");
        write_trace(&path, start, std::slice::from_ref(&project)).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let events = value["traceEvents"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0]["dur"].as_f64().unwrap() >= 0.0);
    }
}
