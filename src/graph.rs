//! DAG Builder (component C4).
//!
//! Classifies every dependency edge between [`Project`]s by matching
//! classpath entries against other projects' output directories, then
//! checks the two structural invariants spec.md §4.4 requires before the
//! scheduler ever sees the graph: no two projects share an output
//! directory, and the dependency relation is acyclic.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::project::Project;

/// How a dependency edge was discovered (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClass {
    /// `--classpath` entry pointing at an upstream project's output that
    /// isn't also a macro dependency of the same project.
    Outline,
    /// `--macro-classpath` entry.
    Macro,
    /// `--plugin-classpath` entry.
    Plugin,
}

impl EdgeClass {
    fn dot_label(self) -> &'static str {
        match self {
            EdgeClass::Outline => "",
            EdgeClass::Macro => "M",
            EdgeClass::Plugin => "P",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Dependency {
    pub from: usize,
    pub to: usize,
    pub class: EdgeClass,
}

/// The built dependency graph: one node per project (indices into the
/// `projects` vector passed to [`Dag::build`]), edges classified per
/// spec.md §4.4, plus the set of classpath entries that point outside the
/// graph entirely (spec.md §4.5 — these feed the Exporter's pre-scan).
#[derive(Debug)]
pub struct Dag {
    pub edges: Vec<Vec<Dependency>>,
    pub external_classpath: HashSet<PathBuf>,
}

/// Records `entry` as external only if it exists on disk (spec.md §4.4:
/// the external-classpath set is scoped to entries that don't correspond
/// to a produced output *and* exist). A stale or typo'd classpath entry
/// that resolves to neither is simply not a dependency of this build —
/// recording it anyway would send it through the exporter's pre-scan,
/// where `fs::metadata` on a nonexistent path aborts the whole run.
fn insert_if_external(external_classpath: &mut HashSet<PathBuf>, entry: &Path) {
    if entry.exists() {
        external_classpath.insert(entry.to_path_buf());
    }
}

impl Dag {
    /// Builds the graph over `projects`. `projects[i].output_dir` is the
    /// node identity used to resolve classpath entries back to indices.
    ///
    /// Classification quirk preserved verbatim from spec.md §9: a
    /// classpath entry pointing at a project that is *also* a macro
    /// dependency of the same consumer is folded into the Macro edge and
    /// not additionally recorded as Outline. The same folding is **not**
    /// applied against plugin dependencies — a project can legitimately
    /// appear as both a Plugin and an Outline dependency of the same
    /// consumer, which produces two parallel edges in the `.dot` output.
    pub fn build(projects: &[Project]) -> Result<Self> {
        let mut by_output_dir: HashMap<&Path, usize> = HashMap::new();
        for (i, p) in projects.iter().enumerate() {
            if let Some(prev) = by_output_dir.insert(p.output_dir.as_path(), i) {
                let _ = prev;
                return Err(BuildError::DuplicateOutputDir(p.output_dir.clone()));
            }
        }

        let mut edges: Vec<Vec<Dependency>> = vec![Vec::new(); projects.len()];
        let mut external_classpath = HashSet::new();

        for (i, p) in projects.iter().enumerate() {
            let macro_targets: HashSet<usize> =
                p.macro_classpath.iter().filter_map(|entry| by_output_dir.get(entry.as_path()).copied()).collect();

            let mut classpath_deps = Vec::new();
            for entry in &p.classpath {
                match by_output_dir.get(entry.as_path()) {
                    Some(&j) if !macro_targets.contains(&j) => classpath_deps.push(j),
                    Some(_) => {}
                    None => insert_if_external(&mut external_classpath, entry),
                }
            }

            let mut macro_deps = Vec::new();
            for entry in &p.macro_classpath {
                match by_output_dir.get(entry.as_path()) {
                    Some(&j) => macro_deps.push(j),
                    None => insert_if_external(&mut external_classpath, entry),
                }
            }

            let mut plugin_deps = Vec::new();
            for entry in &p.plugin_classpath {
                match by_output_dir.get(entry.as_path()) {
                    Some(&j) => plugin_deps.push(j),
                    None => insert_if_external(&mut external_classpath, entry),
                }
            }

            for j in classpath_deps {
                edges[i].push(Dependency { from: i, to: j, class: EdgeClass::Outline });
            }
            for j in macro_deps {
                edges[i].push(Dependency { from: i, to: j, class: EdgeClass::Macro });
            }
            for j in plugin_deps {
                edges[i].push(Dependency { from: i, to: j, class: EdgeClass::Plugin });
            }
        }

        let dag = Self { edges, external_classpath };
        dag.detect_cycle(projects)?;
        Ok(dag)
    }

    /// Three-color DFS cycle detection. Returns [`BuildError::Cycle`] naming
    /// the project labels along the cycle, in dependency order, if one
    /// exists.
    fn detect_cycle(&self, projects: &[Project]) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let n = self.edges.len();
        let mut color = vec![Color::White; n];
        let mut stack = Vec::new();

        fn visit(
            node: usize,
            edges: &[Vec<Dependency>],
            color: &mut [Color],
            stack: &mut Vec<usize>,
            projects: &[Project],
        ) -> Result<()> {
            color[node] = Color::Gray;
            stack.push(node);
            for dep in &edges[node] {
                match color[dep.to] {
                    Color::White => visit(dep.to, edges, color, stack, projects)?,
                    Color::Gray => {
                        let start = stack.iter().position(|&n| n == dep.to).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..].iter().map(|&i| projects[i].label.clone()).collect();
                        cycle.push(projects[dep.to].label.clone());
                        return Err(BuildError::Cycle(cycle));
                    }
                    Color::Black => {}
                }
            }
            stack.pop();
            color[node] = Color::Black;
            Ok(())
        }

        for i in 0..n {
            if color[i] == Color::White {
                visit(i, &self.edges, &mut color, &mut stack, projects)?;
            }
        }
        Ok(())
    }

    /// Writes a Graphviz `.dot` rendering of the graph to `path` (spec.md
    /// §4.4: one node per project label, edges labeled `M`/`P` for
    /// Macro/Plugin, unlabeled for Outline). Takes bare labels rather than
    /// `&[Project]` so callers holding projects behind `Arc` don't need to
    /// reassemble an owned slice just to render the graph.
    pub fn write_dot(&self, labels: &[String], path: &Path) -> Result<()> {
        let mut out = String::from("digraph projects {\n");
        for label in labels {
            let _ = writeln!(out, "  \"{label}\";");
        }
        for (i, deps) in self.edges.iter().enumerate() {
            for dep in deps {
                let edge_label = dep.class.dot_label();
                if edge_label.is_empty() {
                    let _ = writeln!(out, "  \"{}\" -> \"{}\";", labels[i], labels[dep.to]);
                } else {
                    let _ = writeln!(out, "  \"{}\" -> \"{}\" [label=\"{edge_label}\"];", labels[i], labels[dep.to]);
                }
            }
        }
        out.push_str("}\n");
        std::fs::write(path, out)?;
        Ok(())
    }

    pub fn dependencies_of(&self, index: usize) -> &[Dependency] {
        &self.edges[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilers::CompilerSettings;
    use crate::project::Group;

    fn project(label: &str, output_dir: &str, classpath: &[&str], macro_cp: &[&str], plugin_cp: &[&str]) -> Project {
        let output_dir = PathBuf::from(output_dir);
        let settings = CompilerSettings { output_dir: output_dir.clone(), classpath: Vec::new(), extra_args: Vec::new() };
        Project::new(
            label.to_string(),
            PathBuf::from(format!("{label}.args")),
            output_dir,
            vec![PathBuf::from(format!("{label}.src"))],
            classpath.iter().map(PathBuf::from).collect(),
            macro_cp.iter().map(PathBuf::from).collect(),
            plugin_cp.iter().map(PathBuf::from).collect(),
            settings,
            vec![Group::new(0, vec![PathBuf::from(format!("{label}.src"))])],
        )
    }

    #[test]
    fn independent_projects_have_no_edges() {
        let projects = vec![project("a", "out/a", &[], &[], &[]), project("b", "out/b", &[], &[], &[])];
        let dag = Dag::build(&projects).unwrap();
        assert!(dag.edges.iter().all(|e| e.is_empty()));
    }

    #[test]
    fn classpath_edge_is_outline() {
        let projects = vec![project("a", "out/a", &[], &[], &[]), project("b", "out/b", &["out/a"], &[], &[])];
        let dag = Dag::build(&projects).unwrap();
        assert_eq!(dag.edges[1].len(), 1);
        assert_eq!(dag.edges[1][0].class, EdgeClass::Outline);
        assert_eq!(dag.edges[1][0].to, 0);
    }

    #[test]
    fn macro_classpath_suppresses_duplicate_outline_edge() {
        let projects =
            vec![project("a", "out/a", &[], &[], &[]), project("b", "out/b", &["out/a"], &["out/a"], &[])];
        let dag = Dag::build(&projects).unwrap();
        assert_eq!(dag.edges[1].len(), 1);
        assert_eq!(dag.edges[1][0].class, EdgeClass::Macro);
    }

    #[test]
    fn plugin_classpath_does_not_suppress_outline_edge() {
        let projects =
            vec![project("a", "out/a", &[], &[], &[]), project("b", "out/b", &["out/a"], &[], &["out/a"])];
        let dag = Dag::build(&projects).unwrap();
        assert_eq!(dag.edges[1].len(), 2);
        assert!(dag.edges[1].iter().any(|d| d.class == EdgeClass::Outline));
        assert!(dag.edges[1].iter().any(|d| d.class == EdgeClass::Plugin));
    }

    #[test]
    fn external_classpath_entries_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        let vendor = dir.path().join("vendor.archive");
        std::fs::write(&vendor, b"x").unwrap();
        let projects = vec![project("a", "out/a", &[vendor.to_str().unwrap()], &[], &[])];
        let dag = Dag::build(&projects).unwrap();
        assert!(dag.external_classpath.contains(&vendor));
    }

    #[test]
    fn nonexistent_classpath_entry_is_not_external() {
        let projects = vec![project("a", "out/a", &["/no/such/vendor.archive"], &[], &[])];
        let dag = Dag::build(&projects).unwrap();
        assert!(dag.external_classpath.is_empty());
    }

    #[test]
    fn duplicate_output_dir_is_rejected() {
        let projects = vec![project("a", "out/x", &[], &[], &[]), project("b", "out/x", &[], &[], &[])];
        assert!(matches!(Dag::build(&projects), Err(BuildError::DuplicateOutputDir(_))));
    }

    #[test]
    fn cycle_is_rejected() {
        let projects = vec![
            project("a", "out/a", &["out/b"], &[], &[]),
            project("b", "out/b", &["out/a"], &[], &[]),
        ];
        assert!(matches!(Dag::build(&projects), Err(BuildError::Cycle(_))));
    }

    #[test]
    fn linear_chain_has_no_cycle() {
        let projects = vec![
            project("a", "out/a", &[], &[], &[]),
            project("b", "out/b", &["out/a"], &[], &[]),
            project("c", "out/c", &["out/b"], &[], &[]),
        ];
        assert!(Dag::build(&projects).is_ok());
    }
}
