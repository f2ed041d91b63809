//! Module dependency graph
//!
//! The graph is discovered breadth-first from the entry. Every canonical
//! path gets exactly one identity and one analyzer call; imports of an
//! already known path (including ancestors, which is how cycles show up)
//! reuse the existing identity.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::analyzer::Analyze;
use crate::error::{BuildError, BuildResult};
use crate::options::CyclePolicy;
use crate::record::{ModuleId, ModuleRecord, ModuleShell, SpecifierMap};
use crate::resolver::{Resolve, canonicalize_path};

/// Hands out module identities in increasing order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ModuleId {
        let id = ModuleId(self.next);
        self.next += 1;
        id
    }

    /// Number of identities handed out so far.
    pub fn count(&self) -> usize {
        self.next as usize
    }
}

/// FIFO of modules waiting to be analyzed.
#[derive(Debug, Default)]
pub struct Worklist {
    queue: VecDeque<ModuleId>,
}

impl Worklist {
    pub fn push(&mut self, id: ModuleId) {
        self.queue.push_back(id);
    }

    pub fn pop(&mut self) -> Option<ModuleId> {
        self.queue.pop_front()
    }

    /// Take everything queued right now, leaving later pushes for the next round.
    pub fn drain_frontier(&mut self) -> Vec<ModuleId> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Fully linked module graph. Record index equals identity.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    records: Vec<ModuleRecord>,
    by_path: HashMap<PathBuf, ModuleId>,
}

impl ModuleGraph {
    /// All records in identity order.
    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ModuleRecord> {
        self.records
    }

    pub fn get(&self, id: ModuleId) -> Option<&ModuleRecord> {
        self.records.get(id.index())
    }

    pub fn get_by_path(&self, path: &Path) -> Option<&ModuleRecord> {
        self.by_path.get(path).and_then(|id| self.get(*id))
    }

    pub fn entry(&self) -> &ModuleRecord {
        &self.records[ModuleId::ENTRY.index()]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `(importer, dependency)` pairs, one per specifier map entry, in identity order.
    pub fn edges(&self) -> impl Iterator<Item = (ModuleId, ModuleId)> + '_ {
        self.records
            .iter()
            .flat_map(|r| r.dependencies.values().map(move |dep| (r.id, *dep)))
    }

    /// First cycle found by a depth-first walk from the entry.
    pub fn find_cycle(&self) -> Option<Vec<ModuleId>> {
        self.cycles().into_iter().next()
    }

    /// Every cycle closed by a back edge of a depth-first walk from the entry.
    ///
    /// Each cycle starts at the module the back edge points to. The walk
    /// follows specifier order, so the result is deterministic.
    pub fn cycles(&self) -> Vec<Vec<ModuleId>> {
        let mut state = vec![Visit::Unseen; self.records.len()];
        let mut cycles = Vec::new();
        if self.records.is_empty() {
            return cycles;
        }

        // Current DFS path, each module paired with its next dependency index.
        let mut stack = vec![(ModuleId::ENTRY, 0usize)];
        state[ModuleId::ENTRY.index()] = Visit::OnStack;

        while let Some(&(id, next)) = stack.last() {
            let Some((_, &dep)) = self.records[id.index()].dependencies.get_index(next) else {
                stack.pop();
                state[id.index()] = Visit::Done;
                continue;
            };
            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }

            match state[dep.index()] {
                Visit::Unseen => {
                    state[dep.index()] = Visit::OnStack;
                    stack.push((dep, 0));
                }
                Visit::OnStack => {
                    if let Some(pos) = stack.iter().position(|(s, _)| *s == dep) {
                        cycles.push(stack[pos..].iter().map(|(s, _)| *s).collect());
                    }
                }
                Visit::Done => {}
            }
        }

        cycles
    }

    fn paths(&self, ids: &[ModuleId]) -> Vec<PathBuf> {
        ids.iter()
            .filter_map(|id| self.get(*id))
            .map(|r| r.path.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    OnStack,
    Done,
}

/// Discovers the module graph reachable from an entry path.
pub struct GraphBuilder<'a> {
    resolver: &'a dyn Resolve,
    analyzer: &'a dyn Analyze,
    cycles: CyclePolicy,
    parallel: bool,

    ids: IdAllocator,
    worklist: Worklist,
    /// Canonical path → identity, for every enqueued module
    discovered: HashMap<PathBuf, ModuleId>,
    /// Identity → canonical path
    paths: Vec<PathBuf>,
    /// (directory, specifier) → canonical path
    resolved: HashMap<(PathBuf, String), PathBuf>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(resolver: &'a dyn Resolve, analyzer: &'a dyn Analyze) -> Self {
        Self {
            resolver,
            analyzer,
            cycles: CyclePolicy::default(),
            parallel: false,
            ids: IdAllocator::new(),
            worklist: Worklist::default(),
            discovered: HashMap::new(),
            paths: Vec::new(),
            resolved: HashMap::new(),
        }
    }

    pub fn cycles(mut self, policy: CyclePolicy) -> Self {
        self.cycles = policy;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Build the graph for `entry`.
    pub fn build(self, entry: &Path) -> BuildResult<ModuleGraph> {
        let entry = std::fs::canonicalize(entry).map_err(|e| BuildError::read(entry, e))?;
        self.build_canonical(entry)
    }

    fn build_canonical(mut self, entry: PathBuf) -> BuildResult<ModuleGraph> {
        self.discover(entry);

        let mut records: Vec<ModuleRecord> = Vec::new();
        loop {
            let frontier = if self.parallel {
                self.worklist.drain_frontier()
            } else {
                self.worklist.pop().into_iter().collect()
            };
            if frontier.is_empty() {
                break;
            }

            for shell in self.analyze_all(&frontier) {
                let record = self.link(shell?)?;
                debug_assert_eq!(record.id.index(), records.len());
                records.push(record);
            }
        }

        let graph = ModuleGraph {
            records,
            by_path: std::mem::take(&mut self.discovered),
        };
        debug_assert!(graph.records.iter().all(ModuleRecord::is_linked));

        self.check_cycles(&graph)?;

        info!(
            "Built module graph: {} modules, {} edges",
            graph.len(),
            graph.edges().count()
        );
        Ok(graph)
    }

    fn analyze_all(&self, frontier: &[ModuleId]) -> Vec<BuildResult<ModuleShell>> {
        let analyzer = self.analyzer;
        let paths = &self.paths;

        if self.parallel && frontier.len() > 1 {
            frontier
                .par_iter()
                .map(|id| analyzer.analyze(*id, &paths[id.index()]))
                .collect()
        } else {
            frontier
                .iter()
                .map(|id| analyzer.analyze(*id, &paths[id.index()]))
                .collect()
        }
    }

    /// Register a newly seen path and queue it for analysis.
    fn discover(&mut self, path: PathBuf) -> ModuleId {
        let id = self.ids.allocate();
        debug_assert_eq!(id.index(), self.paths.len());
        self.discovered.insert(path.clone(), id);
        self.paths.push(path);
        self.worklist.push(id);
        id
    }

    /// Resolve every specifier of `shell` and turn it into a record.
    fn link(&mut self, shell: ModuleShell) -> BuildResult<ModuleRecord> {
        let dir = shell
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut dependencies = SpecifierMap::new();
        for specifier in &shell.specifiers {
            if dependencies.contains_key(specifier) {
                continue;
            }

            let path = self.resolve(specifier, &dir, &shell.path)?;
            let id = match self.discovered.get(&path) {
                Some(id) => *id,
                None => self.discover(path),
            };

            debug!(
                "Resolved '{}' from {} to module {}",
                specifier,
                shell.path.display(),
                id
            );
            dependencies.insert(specifier.clone(), id);
        }

        let mut record = ModuleRecord::from(shell);
        record.dependencies = dependencies;
        Ok(record)
    }

    fn resolve(&mut self, specifier: &str, dir: &Path, importer: &Path) -> BuildResult<PathBuf> {
        let key = (dir.to_path_buf(), specifier.to_string());
        if let Some(path) = self.resolved.get(&key) {
            return Ok(path.clone());
        }

        let path = self
            .resolver
            .resolve(specifier, dir)
            .map_err(|e| BuildError::Resolution {
                importer: importer.to_path_buf(),
                specifier: specifier.to_string(),
                reason: e.reason,
            })?;
        let path = canonicalize_path(&path);

        self.resolved.insert(key, path.clone());
        Ok(path)
    }

    fn check_cycles(&self, graph: &ModuleGraph) -> BuildResult<()> {
        match self.cycles {
            CyclePolicy::Allow => Ok(()),
            CyclePolicy::Warn => {
                for cycle in graph.cycles() {
                    let paths: Vec<String> = graph
                        .paths(&cycle)
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect();
                    warn!("Circular dependency: {}", paths.join(" -> "));
                }
                Ok(())
            }
            CyclePolicy::Deny => match graph.find_cycle() {
                Some(cycle) => Err(BuildError::Cycle {
                    cycle: graph.paths(&cycle),
                }),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::record::SourceKind;
    use std::sync::Mutex;

    /// In-memory module tree. Specifiers are `./name`, files `/app/name.js`.
    #[derive(Default)]
    struct FakeTree {
        files: HashMap<PathBuf, Vec<String>>,
        analyzed: Mutex<Vec<PathBuf>>,
        resolutions: Mutex<usize>,
    }

    impl FakeTree {
        fn with(mut self, name: &str, imports: &[&str]) -> Self {
            self.files.insert(
                path(name),
                imports.iter().map(|s| format!("./{}", s)).collect(),
            );
            self
        }

        fn analyzed(&self) -> Vec<PathBuf> {
            self.analyzed.lock().unwrap().clone()
        }
    }

    fn path(name: &str) -> PathBuf {
        PathBuf::from(format!("/app/{}.js", name))
    }

    impl Resolve for FakeTree {
        fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError> {
            *self.resolutions.lock().unwrap() += 1;
            let name = specifier.trim_start_matches("./");
            let candidate = from_dir.join(format!("{}.js", name));
            if self.files.contains_key(&candidate) {
                Ok(candidate)
            } else {
                Err(ResolveError::new("Cannot find module"))
            }
        }
    }

    impl Analyze for FakeTree {
        fn analyze(&self, id: ModuleId, path: &Path) -> BuildResult<ModuleShell> {
            self.analyzed.lock().unwrap().push(path.to_path_buf());
            let specifiers = self.files.get(path).cloned().ok_or_else(|| {
                BuildError::read(path, std::io::Error::from(std::io::ErrorKind::NotFound))
            })?;
            Ok(ModuleShell {
                id,
                path: path.to_path_buf(),
                specifiers,
                code: format!("/* {} */", path.display()),
                kind: SourceKind::JavaScript,
            })
        }
    }

    fn build(tree: &FakeTree, parallel: bool, cycles: CyclePolicy) -> BuildResult<ModuleGraph> {
        GraphBuilder::new(tree, tree)
            .parallel(parallel)
            .cycles(cycles)
            .build_canonical(path("entry"))
    }

    #[test]
    fn test_id_allocator_is_monotonic() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(), ModuleId::ENTRY);
        assert_eq!(ids.allocate(), ModuleId(1));
        assert_eq!(ids.allocate(), ModuleId(2));
        assert_eq!(ids.count(), 3);
    }

    #[test]
    fn test_worklist_fifo_and_frontier() {
        let mut worklist = Worklist::default();
        worklist.push(ModuleId(0));
        worklist.push(ModuleId(1));
        assert_eq!(worklist.pop(), Some(ModuleId(0)));
        worklist.push(ModuleId(2));
        assert_eq!(worklist.drain_frontier(), vec![ModuleId(1), ModuleId(2)]);
        assert!(worklist.is_empty());
    }

    #[test]
    fn test_linear_chain() {
        let tree = FakeTree::default()
            .with("entry", &["a"])
            .with("a", &["b"])
            .with("b", &[]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.entry().path, path("entry"));
        assert_eq!(graph.entry().dependency("./a"), Some(ModuleId(1)));
        assert_eq!(graph.get(ModuleId(1)).unwrap().dependency("./b"), Some(ModuleId(2)));
        assert!(graph.get(ModuleId(2)).unwrap().dependencies.is_empty());
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_shared_dependency_analyzed_once() {
        let tree = FakeTree::default()
            .with("entry", &["b", "c"])
            .with("b", &["a"])
            .with("c", &["a"])
            .with("a", &[]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();

        assert_eq!(graph.len(), 4);
        let a = graph.get_by_path(&path("a")).unwrap().id;
        assert_eq!(graph.get_by_path(&path("b")).unwrap().dependency("./a"), Some(a));
        assert_eq!(graph.get_by_path(&path("c")).unwrap().dependency("./a"), Some(a));

        let analyzed = tree.analyzed();
        assert_eq!(analyzed.iter().filter(|p| **p == path("a")).count(), 1);
        assert_eq!(analyzed.len(), 4);
    }

    #[test]
    fn test_breadth_first_identities() {
        let tree = FakeTree::default()
            .with("entry", &["a", "b"])
            .with("a", &["c"])
            .with("b", &[])
            .with("c", &[]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();

        let ids: Vec<PathBuf> = graph.records().iter().map(|r| r.path.clone()).collect();
        assert_eq!(ids, vec![path("entry"), path("a"), path("b"), path("c")]);
    }

    #[test]
    fn test_two_module_cycle() {
        let tree = FakeTree::default()
            .with("entry", &["b"])
            .with("b", &["entry"]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(ModuleId(1)).unwrap().dependency("./entry"), Some(ModuleId::ENTRY));
        assert_eq!(graph.find_cycle(), Some(vec![ModuleId(0), ModuleId(1)]));
        assert_eq!(tree.analyzed().len(), 2);
    }

    #[test]
    fn test_three_module_cycle_back_to_entry() {
        let tree = FakeTree::default()
            .with("entry", &["a"])
            .with("a", &["b"])
            .with("b", &["entry"]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get(ModuleId(2)).unwrap().dependency("./entry"), Some(ModuleId::ENTRY));

        let analyzed = tree.analyzed();
        assert_eq!(analyzed, vec![path("entry"), path("a"), path("b")]);
    }

    #[test]
    fn test_self_import() {
        let tree = FakeTree::default().with("entry", &["entry"]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.entry().dependency("./entry"), Some(ModuleId::ENTRY));
        assert_eq!(graph.find_cycle(), Some(vec![ModuleId::ENTRY]));
    }

    #[test]
    fn test_duplicate_specifiers_resolve_once() {
        let tree = FakeTree::default()
            .with("entry", &["a", "a", "a"])
            .with("a", &[]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();

        assert_eq!(graph.entry().specifiers.len(), 3);
        assert_eq!(graph.entry().dependencies.len(), 1);
        assert_eq!(*tree.resolutions.lock().unwrap(), 1);
    }

    #[test]
    fn test_resolution_cache_shared_by_directory() {
        let tree = FakeTree::default()
            .with("entry", &["a", "b"])
            .with("a", &["shared"])
            .with("b", &["shared"])
            .with("shared", &[]);
        build(&tree, false, CyclePolicy::Allow).unwrap();

        // ./a, ./b, ./shared: the second ./shared from /app is a cache hit
        assert_eq!(*tree.resolutions.lock().unwrap(), 3);
    }

    #[test]
    fn test_unresolvable_specifier() {
        let tree = FakeTree::default().with("entry", &["missing"]);
        let err = build(&tree, false, CyclePolicy::Allow).unwrap_err();

        match err {
            BuildError::Resolution {
                importer,
                specifier,
                ..
            } => {
                assert_eq!(importer, path("entry"));
                assert_eq!(specifier, "./missing");
            }
            other => panic!("expected resolution error, got {:?}", other),
        }
    }

    #[test]
    fn test_every_specifier_mapped() {
        let tree = FakeTree::default()
            .with("entry", &["a", "b", "a"])
            .with("a", &["b"])
            .with("b", &["entry"]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();
        assert!(graph.records().iter().all(ModuleRecord::is_linked));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let tree = FakeTree::default()
            .with("entry", &["a", "b", "c"])
            .with("a", &["d", "e"])
            .with("b", &["e", "entry"])
            .with("c", &["f"])
            .with("d", &[])
            .with("e", &["f"])
            .with("f", &["a"]);

        let sequential = build(&tree, false, CyclePolicy::Allow).unwrap();
        let parallel_tree = FakeTree {
            files: tree.files.clone(),
            ..Default::default()
        };
        let parallel = build(&parallel_tree, true, CyclePolicy::Allow).unwrap();

        assert_eq!(sequential.records(), parallel.records());
        assert_eq!(parallel_tree.analyzed().len(), 7);
    }

    #[test]
    fn test_parallel_first_error_in_id_order() {
        let tree = FakeTree::default()
            .with("entry", &["a", "b"])
            .with("a", &["missing_a"])
            .with("b", &["missing_b"]);
        let err = build(&tree, true, CyclePolicy::Allow).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Resolution { ref specifier, .. } if specifier == "./missing_a"
        ));
    }

    #[test]
    fn test_deny_cycles() {
        let tree = FakeTree::default()
            .with("entry", &["a"])
            .with("a", &["entry"]);
        let err = build(&tree, false, CyclePolicy::Deny).unwrap_err();
        match err {
            BuildError::Cycle { cycle } => assert_eq!(cycle, vec![path("entry"), path("a")]),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_search_handles_deep_chains() {
        const DEPTH: u32 = 200_000;
        let records: Vec<ModuleRecord> = (0..DEPTH)
            .map(|i| {
                let next = ModuleId((i + 1) % DEPTH);
                let mut record =
                    ModuleRecord::new(ModuleId(i), format!("/app/m{}.js", i), vec![], "");
                record.dependencies.insert(format!("./m{}", next.index()), next);
                record
            })
            .collect();
        let graph = ModuleGraph {
            by_path: records.iter().map(|r| (r.path.clone(), r.id)).collect(),
            records,
        };

        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.len(), DEPTH as usize);
        assert_eq!(cycle.first(), Some(&ModuleId::ENTRY));
        assert_eq!(cycle.last(), Some(&ModuleId(DEPTH - 1)));
    }

    #[test]
    fn test_warn_cycles_still_builds() {
        let tree = FakeTree::default()
            .with("entry", &["a"])
            .with("a", &["entry"]);
        assert_eq!(build(&tree, false, CyclePolicy::Warn).unwrap().len(), 2);
    }

    #[test]
    fn test_deny_allows_acyclic_graph() {
        let tree = FakeTree::default()
            .with("entry", &["a", "b"])
            .with("a", &["b"])
            .with("b", &[]);
        assert!(build(&tree, false, CyclePolicy::Deny).is_ok());
    }

    #[test]
    fn test_edges() {
        let tree = FakeTree::default()
            .with("entry", &["a", "b"])
            .with("a", &["b"])
            .with("b", &[]);
        let graph = build(&tree, false, CyclePolicy::Allow).unwrap();
        let edges: Vec<_> = graph.edges().collect();
        assert_eq!(
            edges,
            vec![
                (ModuleId(0), ModuleId(1)),
                (ModuleId(0), ModuleId(2)),
                (ModuleId(1), ModuleId(2)),
            ]
        );
    }

    #[test]
    fn test_missing_entry_is_read_error() {
        let tree = FakeTree::default();
        let result = GraphBuilder::new(&tree, &tree).build(Path::new("/definitely/not/here.js"));
        assert!(matches!(result, Err(BuildError::Read { .. })));
    }
}
