//! Project Runner (component C6).
//!
//! Holds the three sub-operations the Scheduler calls into for a single
//! project — `full_compile_export_pickles`, `full_compile`, `java_compile`
//! — plus classpath rewriting. Each sub-operation is the sole writer of the
//! signals it documents completing, and completes them exactly once
//! (`complete_idempotent`, since a sub-operation's own error path and a
//! sibling failure elsewhere in the project can race to resolve the same
//! signal).
//!
//! Execution inside a sub-operation is synchronous and blocking (spec.md
//! §5: "the front-end is treated as opaque"); the Scheduler is responsible
//! for running these on a worker thread (`tokio::task::spawn_blocking`)
//! rather than the async runtime's own threads.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::cache::SummaryCache;
use crate::compilers::{CompilerSettings, FrontEndFactory, SecondaryCompiler, SymbolTable};
use crate::exporter::Exporter;
use crate::project::{Project, SignalResult};

pub struct Runner {
    front_end_factory: Arc<dyn FrontEndFactory>,
    secondary_compiler: Arc<dyn SecondaryCompiler>,
    exporter: Arc<Exporter>,
    cache: Arc<SummaryCache>,
}

impl Runner {
    pub fn new(
        front_end_factory: Arc<dyn FrontEndFactory>,
        secondary_compiler: Arc<dyn SecondaryCompiler>,
        exporter: Arc<Exporter>,
        cache: Arc<SummaryCache>,
    ) -> Self {
        Self { front_end_factory, secondary_compiler, exporter, cache }
    }

    /// Under the pipeline strategy, every classpath entry pointing at
    /// another project's output directory is replaced by its cached
    /// summary artifact (spec.md §4.6 "Classpath rewriting"). Entries with
    /// no published mapping (external jars, or any entry under the
    /// traditional strategy where nothing has published yet) pass through
    /// unchanged.
    pub fn rewrite_classpath(&self, classpath: &[PathBuf]) -> Vec<PathBuf> {
        classpath.iter().map(|entry| self.cache.substitute(entry)).collect()
    }

    /// Pipeline path for a project that is depended on by at least one
    /// other project. Single group, one long-lived compiler instance,
    /// closed only after this call returns.
    pub fn full_compile_export_pickles(&self, project: &Project, classpath: Vec<PathBuf>) {
        let settings = CompilerSettings {
            output_dir: project.output_dir.clone(),
            classpath,
            extra_args: project.settings.extra_args.clone(),
        };
        let mut compiler = self.front_end_factory.new_compiler(&settings);
        let group = &project.groups[0];

        if let Err(e) = project.outline_timer.lock().unwrap().start() {
            fail_both(project, group, e.to_string());
            compiler.close();
            return;
        }

        let boundary_error: Mutex<Option<String>> = Mutex::new(None);
        let compile_result = {
            let mut on_outline = |table: &SymbolTable| {
                if let Some(err) = self.cross_outline_boundary(project, group, table) {
                    *boundary_error.lock().unwrap() = Some(err);
                }
            };
            compiler.compile(&group.files, &mut on_outline)
        };

        match compile_result {
            Ok(_) if boundary_error.lock().unwrap().is_some() => {
                let msg = boundary_error.into_inner().unwrap().unwrap();
                fail_both(project, group, msg);
            }
            Ok(report) if report.has_errors => {
                // The boundary already resolved `outline_done` on the happy
                // path; only the group's own completion reflects a failure
                // discovered after summaries were already exported.
                stop_timer(&group.timer);
                group.done.complete_idempotent(SignalResult::Failure(report.messages.join("; ")));
            }
            Ok(_) => {
                stop_timer(&group.timer);
                group.done.complete_idempotent(SignalResult::Success);
            }
            Err(e) => fail_both(project, group, e.to_string()),
        }

        compiler.close();
    }

    /// Runs at the summary-materialization phase boundary: stops the
    /// outline timer, exports the symbol table, starts the group timer,
    /// resolves `outline_done`. Returns `Some(message)` if any step fails
    /// (the caller is still mid-`compile()`, so it can only record the
    /// error and let the group's own completion carry it).
    fn cross_outline_boundary(
        &self,
        project: &Project,
        group: &crate::project::Group,
        table: &SymbolTable,
    ) -> Option<String> {
        if let Err(e) = project.outline_timer.lock().unwrap().stop() {
            return Some(e.to_string());
        }

        let export_result = {
            let mut timer = project.pickle_export_timer.lock().unwrap();
            timer.start().ok();
            drop(timer);
            let result = self.exporter.export_symbols(&project.output_dir, table);
            let mut timer = project.pickle_export_timer.lock().unwrap();
            let _ = timer.stop();
            result
        };
        if let Err(e) = export_result {
            return Some(e.to_string());
        }

        if let Err(e) = group.timer.lock().unwrap().start() {
            return Some(e.to_string());
        }

        project.outline_done.complete_idempotent(SignalResult::Success);
        None
    }

    /// Used when a project isn't depended on by anyone, or under the
    /// traditional strategy (spec.md §4.6). Each group is compiled
    /// independently in its own freshly constructed compiler instance.
    pub fn full_compile(&self, project: &Project, classpath: Vec<PathBuf>) {
        project.outline_done.complete_idempotent(SignalResult::Success);

        for group in &project.groups {
            let settings = CompilerSettings {
                output_dir: project.output_dir.clone(),
                classpath: classpath.clone(),
                extra_args: project.settings.extra_args.clone(),
            };
            let mut compiler = self.front_end_factory.new_compiler(&settings);

            if let Err(e) = group.timer.lock().unwrap().start() {
                group.done.complete_idempotent(SignalResult::Failure(e.to_string()));
                compiler.close();
                continue;
            }

            let mut ignore_outline = |_: &SymbolTable| {};
            let result = compiler.compile(&group.files, &mut ignore_outline);
            stop_timer(&group.timer);

            match result {
                Ok(report) if report.has_errors => {
                    group.done.complete_idempotent(SignalResult::Failure(report.messages.join("; ")));
                }
                Ok(_) => group.done.complete_idempotent(SignalResult::Success),
                Err(e) => group.done.complete_idempotent(SignalResult::Failure(e.to_string())),
            }
            compiler.close();
        }
    }

    /// Compiles the project's secondary-language sources, if any, with the
    /// project's own output directory prepended to its classpath so the
    /// just-compiled primary-language classes are visible.
    pub fn java_compile(&self, project: &Project, classpath: Vec<PathBuf>) {
        if !project.has_secondary_sources() {
            project.java_done.complete_idempotent(SignalResult::Success);
            return;
        }

        if project.java_timer.lock().unwrap().start().is_err() {
            project.java_done.complete_idempotent(SignalResult::Failure(format!(
                "{}: java timer already started",
                project.label
            )));
            return;
        }

        let mut full_classpath = vec![project.output_dir.clone()];
        full_classpath.extend(classpath);
        let files = project.secondary_sources();
        let result = self.secondary_compiler.compile(&project.output_dir, &full_classpath, &files);

        stop_timer(&project.java_timer);

        match result {
            Ok(true) => project.java_done.complete_idempotent(SignalResult::Success),
            Ok(false) => project
                .java_done
                .complete_idempotent(SignalResult::Failure(format!("{}: secondary compile failed", project.label))),
            Err(e) => project.java_done.complete_idempotent(SignalResult::Failure(e.to_string())),
        }
    }
}

fn stop_timer(timer: &Mutex<crate::timer::Timer>) {
    let _ = timer.lock().unwrap().stop();
}

fn fail_both(project: &Project, group: &crate::project::Group, message: String) {
    project.outline_done.complete_idempotent(SignalResult::Failure(message.clone()));
    group.done.complete_idempotent(SignalResult::Failure(message));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SummaryCache;
    use crate::compilers::reference::{ReferenceFrontEndFactory, ReferenceSecondaryCompiler};
    use crate::compilers::reference::ReferencePickleExtractor;
    use crate::project::Group;
    use std::fs;

    fn runner_with_cache() -> (Runner, tempfile::TempDir) {
        let cache = Arc::new(SummaryCache::ephemeral(false).unwrap());
        let exporter = Arc::new(Exporter::new(cache.clone(), Arc::new(ReferencePickleExtractor), false));
        let runner = Runner::new(
            Arc::new(ReferenceFrontEndFactory),
            Arc::new(ReferenceSecondaryCompiler),
            exporter,
            cache,
        );
        let dir = tempfile::tempdir().unwrap();
        (runner, dir)
    }

    fn simple_project(dir: &std::path::Path) -> Project {
        let src = dir.join("A.src");
        fs::write(&src, "hello").unwrap();
        let output_dir = dir.join("out");
        fs::create_dir_all(&output_dir).unwrap();
        let settings = CompilerSettings { output_dir: output_dir.clone(), classpath: Vec::new(), extra_args: Vec::new() };
        Project::new(
            "a".into(),
            dir.join("a.args"),
            output_dir,
            vec![src.clone()],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            settings,
            vec![Group::new(0, vec![src])],
        )
    }

    #[test]
    fn full_compile_export_pickles_resolves_both_signals() {
        let (runner, dir) = runner_with_cache();
        let project = simple_project(dir.path());
        runner.full_compile_export_pickles(&project, Vec::new());
        assert_eq!(project.outline_done.peek(), Some(SignalResult::Success));
        assert_eq!(project.groups[0].done.peek(), Some(SignalResult::Success));
    }

    #[test]
    fn full_compile_resolves_outline_unconditionally() {
        let (runner, dir) = runner_with_cache();
        let project = simple_project(dir.path());
        runner.full_compile(&project, Vec::new());
        assert_eq!(project.outline_done.peek(), Some(SignalResult::Success));
        assert_eq!(project.groups[0].done.peek(), Some(SignalResult::Success));
    }

    #[test]
    fn compile_error_marker_fails_the_group() {
        let (runner, dir) = runner_with_cache();
        let project = simple_project(dir.path());
        fs::write(&project.source_files[0], crate::compilers::reference::COMPILE_ERROR_MARKER).unwrap();
        runner.full_compile(&project, Vec::new());
        assert!(matches!(project.groups[0].done.peek(), Some(SignalResult::Failure(_))));
    }

    #[test]
    fn java_compile_without_secondary_sources_completes_immediately() {
        let (runner, dir) = runner_with_cache();
        let project = simple_project(dir.path());
        runner.java_compile(&project, Vec::new());
        assert_eq!(project.java_done.peek(), Some(SignalResult::Success));
    }
}
