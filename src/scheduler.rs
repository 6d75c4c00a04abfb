//! Scheduler (component C7) — the top-level engine.
//!
//! Owns strategy selection, the per-edge-class wait policy, the 60-second
//! progress/stall monitor, critical-path accounting, and trace emission.
//! Project-local work (the actual compile calls) is delegated to
//! [`crate::runner::Runner`]; this module only decides *when* to call it
//! and how to aggregate the outcome.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::exporter::Exporter;
use crate::graph::{Dag, EdgeClass};
use crate::options::Strategy;
use crate::project::{Project, SignalResult};
use crate::report::Reporter;
use crate::runner::Runner;
use crate::trace;

const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of one top-level [`Scheduler::run`] call.
#[derive(Debug)]
pub struct BuildSummary {
    pub success: bool,
    pub wall_clock_ms: f64,
    pub failed_projects: Vec<String>,
}

pub struct Scheduler {
    runner: Arc<Runner>,
    exporter: Arc<Exporter>,
    reporter: Arc<Reporter>,
    strategy: Strategy,
    parallelism: usize,
}

impl Scheduler {
    pub fn new(
        runner: Arc<Runner>,
        exporter: Arc<Exporter>,
        reporter: Arc<Reporter>,
        strategy: Strategy,
        parallelism: usize,
    ) -> Self {
        Self { runner, exporter, reporter, strategy, parallelism }
    }

    /// Runs every project to completion, then writes `projects.dot` and the
    /// trace file under `out_dir`.
    pub async fn run(&self, mut projects: Vec<Project>, out_dir: &Path, label: &str) -> Result<BuildSummary> {
        if self.strategy == Strategy::Pipeline {
            for p in &mut projects {
                p.collapse_to_single_group();
            }
        }

        let dag = Dag::build(&projects)?;
        self.exporter.prescan_external_classpath(&dag.external_classpath, &self.reporter)?;

        let labels: Vec<String> = projects.iter().map(|p| p.label.clone()).collect();
        let projects: Vec<Arc<Project>> = projects.into_iter().map(Arc::new).collect();
        let depended_on = compute_depended_on(&dag, projects.len());

        let build_start = Instant::now();
        let all_projects = Arc::new(projects.clone());

        let mut handles = Vec::with_capacity(projects.len());
        for (i, project) in projects.iter().enumerate() {
            let runner = self.runner.clone();
            let project = project.clone();
            let edges = dag.edges[i].clone();
            let all_projects = all_projects.clone();
            let strategy = self.strategy;
            let is_depended_on = depended_on[i];
            handles.push(tokio::spawn(run_project_chain(runner, project, edges, all_projects, strategy, is_depended_on)));
        }

        self.await_with_stall_monitor(&projects, handles).await;

        let wall_clock_ms = build_start.elapsed().as_secs_f64() * 1_000.0;

        compute_critical_paths(&projects, &dag, self.strategy);
        if self.parallelism == 1 {
            let max_critical = projects
                .iter()
                .filter_map(|p| *p.full_critical_path_ms.lock().unwrap())
                .fold(0.0_f64, f64::max);
            info!(wall_clock_ms, max_critical_path_ms = max_critical, "single-threaded run complete");
        }

        let failed_projects: Vec<String> =
            projects.iter().filter(|p| project_failed(p)).map(|p| p.label.clone()).collect();

        std::fs::create_dir_all(out_dir)?;
        dag.write_dot(&labels, &out_dir.join("projects.dot"))?;
        trace::write_trace(
            &out_dir.join(format!("build-{label}.trace")),
            build_start,
            projects.iter().map(Arc::as_ref),
        )?;

        Ok(BuildSummary { success: failed_projects.is_empty(), wall_clock_ms, failed_projects })
    }

    async fn await_with_stall_monitor(&self, projects: &[Arc<Project>], handles: Vec<tokio::task::JoinHandle<()>>) {
        let all = futures::future::join_all(handles);
        tokio::pin!(all);

        let mut last_completed = 0usize;
        loop {
            match tokio::time::timeout(STALL_TIMEOUT, &mut all).await {
                Ok(_) => return,
                Err(_elapsed) => {
                    let completed = count_completed_signals(projects);
                    if completed > last_completed {
                        self.reporter.echo(&format!("progress: {completed} signals completed"));
                        last_completed = completed;
                    } else {
                        self.reporter.warn("build appears stalled; per-project status:");
                        for project in projects {
                            self.reporter.warn(&project_status_row(project));
                        }
                    }
                }
            }
        }
    }
}

/// A project counts as failed if *any* of its signals resolved to
/// `Failure` — `outline_done`, any group's `done`, or `java_done`.
/// `java_done` alone isn't enough: a project with no secondary sources
/// resolves `java_done` to `Success` unconditionally (`Runner::java_compile`)
/// even when its own group compile failed.
fn project_failed(project: &Project) -> bool {
    matches!(project.outline_done.peek(), Some(SignalResult::Failure(_)))
        || matches!(project.java_done.peek(), Some(SignalResult::Failure(_)))
        || project.groups.iter().any(|g| matches!(g.done.peek(), Some(SignalResult::Failure(_))))
}

fn compute_depended_on(dag: &Dag, n: usize) -> Vec<bool> {
    let mut depended_on = vec![false; n];
    for edges in &dag.edges {
        for dep in edges {
            depended_on[dep.to] = true;
        }
    }
    depended_on
}

fn count_completed_signals(projects: &[Arc<Project>]) -> usize {
    projects
        .iter()
        .map(|p| {
            let mut n = 0;
            if p.outline_done.is_completed() {
                n += 1;
            }
            if p.java_done.is_completed() {
                n += 1;
            }
            n += p.groups.iter().filter(|g| g.done.is_completed()).count();
            n
        })
        .sum()
}

fn status_char(signal: Option<SignalResult>) -> char {
    match signal {
        None => '-',
        Some(SignalResult::Success) => 'x',
        Some(SignalResult::Failure(_)) => '!',
    }
}

fn project_status_row(project: &Project) -> String {
    let outline = status_char(project.outline_done.peek());
    let group_states: Vec<Option<SignalResult>> = project.groups.iter().map(|g| g.done.peek()).collect();
    let groups = if group_states.iter().any(|s| matches!(s, Some(SignalResult::Failure(_)))) {
        '!'
    } else if !group_states.is_empty() && group_states.iter().all(|s| matches!(s, Some(SignalResult::Success))) {
        'x'
    } else {
        '-'
    };
    let java = status_char(project.java_done.peek());
    format!("{outline}{groups}{java} {}", project.label)
}

async fn run_project_chain(
    runner: Arc<Runner>,
    project: Arc<Project>,
    edges: Vec<crate::graph::Dependency>,
    all_projects: Arc<Vec<Arc<Project>>>,
    strategy: Strategy,
    is_depended_on: bool,
) {
    for dep in &edges {
        let upstream = &all_projects[dep.to];
        let wait_result = match strategy {
            Strategy::Pipeline => match dep.class {
                EdgeClass::Outline => upstream.outline_done.wait().await,
                EdgeClass::Macro | EdgeClass::Plugin => upstream.java_done.wait().await,
            },
            Strategy::Traditional => upstream.java_done.wait().await,
        };
        if !wait_result.is_success() {
            propagate_failure(&project, wait_result);
            return;
        }
    }

    let classpath = match strategy {
        Strategy::Pipeline => runner.rewrite_classpath(&project.classpath),
        Strategy::Traditional => project.classpath.clone(),
    };

    let compile_runner = runner.clone();
    let compile_project = project.clone();
    let compile_classpath = classpath.clone();
    let use_pipeline_export = strategy == Strategy::Pipeline && is_depended_on;
    let compile_task = tokio::task::spawn_blocking(move || {
        if use_pipeline_export {
            compile_runner.full_compile_export_pickles(&compile_project, compile_classpath);
        } else {
            compile_runner.full_compile(&compile_project, compile_classpath);
        }
    });
    let _ = compile_task.await;

    let java_runner = runner.clone();
    let java_project = project.clone();
    let java_classpath = classpath;
    let java_task =
        tokio::task::spawn_blocking(move || java_runner.java_compile(&java_project, java_classpath));
    let _ = java_task.await;
}

fn propagate_failure(project: &Project, result: SignalResult) {
    project.outline_done.complete_idempotent(result.clone());
    for group in &project.groups {
        group.done.complete_idempotent(result.clone());
    }
    project.java_done.complete_idempotent(result);
}

/// Critical-path accounting (spec.md §4.7). Under the traditional strategy
/// only `full_critical_path_ms` is meaningful, since outline never runs
/// ahead of the rest of the project; the pipeline strategy fills in all
/// three accumulators.
fn compute_critical_paths(projects: &[Arc<Project>], dag: &Dag, strategy: Strategy) {
    let n = projects.len();
    let mut outline_memo = vec![None; n];
    let mut regular_memo = vec![None; n];
    let mut full_memo = vec![None; n];

    for i in 0..n {
        let full = full_critical_path(i, projects, dag, &mut full_memo);
        *projects[i].full_critical_path_ms.lock().unwrap() = Some(full);
    }

    if strategy == Strategy::Pipeline {
        for i in 0..n {
            let outline = outline_critical_path(i, projects, dag, &mut outline_memo);
            *projects[i].outline_critical_path_ms.lock().unwrap() = Some(outline);
            let regular = regular_critical_path(i, projects, dag, &mut outline_memo, &mut regular_memo);
            *projects[i].regular_critical_path_ms.lock().unwrap() = Some(regular);
        }
    }
}

fn outline_critical_path(i: usize, projects: &[Arc<Project>], dag: &Dag, memo: &mut [Option<f64>]) -> f64 {
    if let Some(v) = memo[i] {
        return v;
    }
    let upstream_max =
        dag.edges[i].iter().map(|d| outline_critical_path(d.to, projects, dag, memo)).fold(0.0_f64, f64::max);
    let v = upstream_max + projects[i].outline_timer.lock().unwrap().duration_ms();
    memo[i] = Some(v);
    v
}

fn regular_critical_path(
    i: usize,
    projects: &[Arc<Project>],
    dag: &Dag,
    outline_memo: &mut [Option<f64>],
    memo: &mut [Option<f64>],
) -> f64 {
    if let Some(v) = memo[i] {
        return v;
    }
    let upstream_outline_max =
        dag.edges[i].iter().map(|d| outline_critical_path(d.to, projects, dag, outline_memo)).fold(0.0_f64, f64::max);
    let widest_group =
        projects[i].groups.iter().map(|g| g.timer.lock().unwrap().duration_ms()).fold(0.0_f64, f64::max);
    let v = upstream_outline_max + widest_group;
    memo[i] = Some(v);
    v
}

fn full_critical_path(i: usize, projects: &[Arc<Project>], dag: &Dag, memo: &mut [Option<f64>]) -> f64 {
    if let Some(v) = memo[i] {
        return v;
    }
    let upstream_max = dag.edges[i].iter().map(|d| full_critical_path(d.to, projects, dag, memo)).fold(0.0_f64, f64::max);
    let group_sum: f64 = projects[i].groups.iter().map(|g| g.timer.lock().unwrap().duration_ms()).sum();
    let v = upstream_max + group_sum;
    memo[i] = Some(v);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SummaryCache;
    use crate::compilers::reference::{ReferenceFrontEndFactory, ReferencePickleExtractor, ReferenceSecondaryCompiler};
    use crate::compilers::CompilerSettings;
    use crate::exporter::Exporter;
    use crate::project::Group;
    use std::fs;
    use std::path::PathBuf;

    fn scheduler(strategy: Strategy) -> (Scheduler, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SummaryCache::ephemeral(false).unwrap());
        let exporter = Arc::new(Exporter::new(cache.clone(), Arc::new(ReferencePickleExtractor), false));
        let runner = Arc::new(Runner::new(
            Arc::new(ReferenceFrontEndFactory),
            Arc::new(ReferenceSecondaryCompiler),
            exporter.clone(),
            cache,
        ));
        let reporter = Arc::new(Reporter::new());
        (Scheduler::new(runner, exporter, reporter, strategy, 2), dir)
    }

    fn write_project(dir: &Path, label: &str, classpath: Vec<PathBuf>, content: &str) -> Project {
        let src = dir.join(format!("{label}.src"));
        fs::write(&src, content).unwrap();
        let output_dir = dir.join(format!("{label}-out"));
        let settings = CompilerSettings { output_dir: output_dir.clone(), classpath: classpath.clone(), extra_args: vec![] };
        Project::new(
            label.to_string(),
            dir.join(format!("{label}.args")),
            output_dir,
            vec![src.clone()],
            classpath,
            vec![],
            vec![],
            settings,
            vec![Group::new(0, vec![src])],
        )
    }

    #[tokio::test]
    async fn two_independent_projects_both_succeed() {
        let (scheduler, dir) = scheduler(Strategy::Pipeline);
        let a = write_project(dir.path(), "a", vec![], "hello a");
        let b = write_project(dir.path(), "b", vec![], "hello b");
        let out_dir = dir.path().join("out");
        let summary = scheduler.run(vec![a, b], &out_dir, "test").await.unwrap();
        assert!(summary.success);
        assert!(out_dir.join("projects.dot").exists());
        assert!(out_dir.join("build-test.trace").exists());
    }

    #[tokio::test]
    async fn linear_chain_propagates_outline_dependency() {
        let (scheduler, dir) = scheduler(Strategy::Pipeline);
        let a = write_project(dir.path(), "a", vec![], "hello a");
        let a_out = a.output_dir.clone();
        fs::create_dir_all(&a_out).unwrap();
        let b = write_project(dir.path(), "b", vec![a_out], "hello b");
        let out_dir = dir.path().join("out");
        let summary = scheduler.run(vec![a, b], &out_dir, "test").await.unwrap();
        assert!(summary.success);
    }

    #[tokio::test]
    async fn failing_upstream_fails_downstream() {
        let (scheduler, dir) = scheduler(Strategy::Pipeline);
        let a = write_project(dir.path(), "a", vec![], crate::compilers::reference::COMPILE_ERROR_MARKER);
        let a_out = a.output_dir.clone();
        fs::create_dir_all(&a_out).unwrap();
        let b = write_project(dir.path(), "b", vec![a_out], "hello b");
        let out_dir = dir.path().join("out");
        let summary = scheduler.run(vec![a, b], &out_dir, "test").await.unwrap();
        assert!(!summary.success);
        assert!(summary.failed_projects.contains(&"a".to_string()));
        assert!(summary.failed_projects.contains(&"b".to_string()));
    }
}
