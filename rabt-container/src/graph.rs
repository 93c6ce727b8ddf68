//! Dependency graph: validation and startup ordering.
//!
//! Built from a snapshot of the registry when the container starts:
//! - every required dependency must resolve locally or through a chained
//!   locator
//! - the graph of resolved edges must be acyclic
//! - binders are split into two stages, each ordered so that dependencies
//!   start before their dependents
//!
//! Nothing is started until all of this has succeeded.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rabt_support::rendering::PlanEntry;
use tracing::{debug, instrument, warn};

use crate::binder::{Binder, BinderId};
use crate::dependency::Dependency;
use crate::error::{CircularDependencyError, RabtError, Result, UnresolvedDependencyError};
use crate::kind::{BinderKind, Stage};
use crate::registry::Registry;

/// Binders in the order they are started.
///
/// Stage 1 holds externals, interceptors and providers plus everything
/// they depend on; stage 2 holds the remaining singletons and prototypes.
/// Stopping walks both stages backwards, stage 2 first.
#[derive(Clone, Default)]
pub struct StartupOrder {
    stage1: Vec<Arc<dyn Binder>>,
    stage2: Vec<Arc<dyn Binder>>,
}

impl StartupOrder {
    pub fn stage1(&self) -> &[Arc<dyn Binder>] {
        &self.stage1
    }

    pub fn stage2(&self) -> &[Arc<dyn Binder>] {
        &self.stage2
    }

    pub fn stage(&self, stage: Stage) -> &[Arc<dyn Binder>] {
        match stage {
            Stage::Infrastructure => &self.stage1,
            Stage::Application => &self.stage2,
        }
    }

    /// Where a binder starts: its stage and its position in that stage.
    pub fn position(&self, id: &BinderId) -> Option<(Stage, usize)> {
        [Stage::Infrastructure, Stage::Application]
            .into_iter()
            .find_map(|stage| {
                self.stage(stage)
                    .iter()
                    .position(|b| b.id() == id)
                    .map(|index| (stage, index))
            })
    }

    pub fn len(&self) -> usize {
        self.stage1.len() + self.stage2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One plan entry per binder, in start order.
    pub fn plan(&self) -> Vec<PlanEntry> {
        [Stage::Infrastructure, Stage::Application]
            .into_iter()
            .flat_map(|stage| {
                self.stage(stage).iter().map(move |binder| PlanEntry {
                    stage: stage.number(),
                    kind: binder.kind().to_string(),
                    label: binder.id().label(),
                    name: binder.name().map(str::to_string),
                })
            })
            .collect()
    }
}

impl fmt::Debug for StartupOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = |binders: &[Arc<dyn Binder>]| binders.iter().map(|b| b.id().label()).collect::<Vec<_>>();
        f.debug_struct("StartupOrder")
            .field("stage1", &labels(&self.stage1))
            .field("stage2", &labels(&self.stage2))
            .finish()
    }
}

/// Resolved dependency edges between registered binders.
pub(crate) struct DependencyGraph {
    registry: Registry,
    /// `edges[i]` lists the binders binder `i` depends on.
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Resolves every dependency edge of the snapshot.
    ///
    /// # Errors
    /// [`RabtError::Unresolved`] for a required dependency no local binder
    /// and no chained locator satisfies.
    pub fn build(registry: Registry) -> Result<Self> {
        let mut edges = Vec::with_capacity(registry.len());

        for binder in registry.binders() {
            let mut resolved = Vec::new();
            for dependency in binder.dependencies() {
                if let Some(index) = registry.resolve(dependency) {
                    resolved.push(index);
                    continue;
                }
                if !dependency.is_required() {
                    debug!(binder = %binder.id(), dependency = %dependency, "Optional dependency unresolved");
                    continue;
                }
                if chained_satisfies(&registry, dependency)? {
                    debug!(binder = %binder.id(), dependency = %dependency, "Dependency satisfied by a chained locator");
                    continue;
                }
                warn!(binder = %binder.id(), dependency = %dependency, "Cannot resolve dependency");
                return Err(RabtError::Unresolved(UnresolvedDependencyError {
                    dependency: dependency.clone(),
                    required_by: Some(binder.id().to_string()),
                    suggestions: registry.suggestions(dependency.capability()),
                }));
            }
            edges.push(resolved);
        }

        Ok(Self { registry, edges })
    }

    /// Fails on the first cycle found.
    ///
    /// # Algorithm
    /// Depth-first search over all binders. A binder met again while it is
    /// still on the current path closes a cycle.
    #[instrument(skip(self), name = "graph_validation")]
    pub fn check_cycles(&self) -> Result<()> {
        let mut search = CycleSearch {
            graph: self,
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
        };
        for index in 0..self.edges.len() {
            search.visit(index)?;
        }
        debug!(binders = self.edges.len(), "Dependency graph is acyclic");
        Ok(())
    }

    /// Computes the two-stage startup order.
    ///
    /// Within a stage, binders start from registration order; every
    /// dependency is moved to the front of the stage, then its own
    /// dependencies in turn, so it ends up ahead of everything that needs
    /// it. A stage 2 dependency on a stage 1 binder needs no move: stage 1
    /// has fully started by then. Requires an acyclic graph.
    pub fn order(&self) -> StartupOrder {
        let stage1 = self.arrange(
            &[BinderKind::External, BinderKind::Interceptor, BinderKind::Provider],
            &HashSet::new(),
        );
        let earlier: HashSet<usize> = stage1.iter().copied().collect();
        let stage2 = self.arrange(&[BinderKind::Singleton, BinderKind::Prototype], &earlier);

        let binders = |stage: Vec<usize>| -> Vec<Arc<dyn Binder>> {
            stage.into_iter().map(|i| Arc::clone(self.registry.binder(i))).collect()
        };
        StartupOrder {
            stage1: binders(stage1),
            stage2: binders(stage2),
        }
    }

    /// Orders the binders of one stage, leaving out those in `earlier`.
    ///
    /// # Algorithm
    /// Roots are appended in registration order unless an earlier move
    /// already placed them. The last move to the front wins, so replaying
    /// the moves backwards as a post-order walk (dependencies visited in
    /// reverse) yields the front of the stage with every binder placed
    /// once. Linear in binders plus edges.
    fn arrange(&self, kinds: &[BinderKind], earlier: &HashSet<usize>) -> Vec<usize> {
        let mut reached = vec![false; self.edges.len()];
        let mut appended = Vec::new();
        let mut moved = Vec::new();

        for root in self.registry.of_kind(kinds) {
            if earlier.contains(&root) || reached[root] {
                continue;
            }
            reached[root] = true;
            appended.push(root);
            for &dependency in &self.edges[root] {
                moved.push(dependency);
                self.reach(dependency, earlier, &mut reached);
            }
        }

        let mut placed = vec![false; self.edges.len()];
        let mut stage = Vec::with_capacity(appended.len() + moved.len());
        for &dependency in moved.iter().rev() {
            self.place(dependency, earlier, &mut placed, &mut stage);
        }
        stage.extend(appended.into_iter().filter(|&root| !placed[root]));
        stage
    }

    fn reach(&self, index: usize, earlier: &HashSet<usize>, reached: &mut [bool]) {
        if earlier.contains(&index) || reached[index] {
            return;
        }
        reached[index] = true;
        for &dependency in &self.edges[index] {
            self.reach(dependency, earlier, reached);
        }
    }

    fn place(&self, index: usize, earlier: &HashSet<usize>, placed: &mut [bool], stage: &mut Vec<usize>) {
        if earlier.contains(&index) || placed[index] {
            return;
        }
        placed[index] = true;
        for &dependency in self.edges[index].iter().rev() {
            self.place(dependency, earlier, placed, stage);
        }
        stage.push(index);
    }
}

fn chained_satisfies(registry: &Registry, dependency: &Dependency) -> Result<bool> {
    for locator in registry.chained() {
        let found = match dependency.name() {
            Some(name) => locator.lookup_named(name, dependency.capability())?,
            None => locator.lookup(dependency.capability())?,
        };
        if found.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

struct CycleSearch<'g> {
    graph: &'g DependencyGraph,
    visiting: HashSet<usize>,
    validated: HashSet<usize>,
    path: Vec<usize>,
}

impl CycleSearch<'_> {
    fn visit(&mut self, index: usize) -> Result<()> {
        if self.validated.contains(&index) {
            return Ok(());
        }

        if self.visiting.contains(&index) {
            let start = self.path.iter().position(|&i| i == index).unwrap_or(0);
            let chain: Vec<String> = self.path[start..]
                .iter()
                .chain(std::iter::once(&index))
                .map(|&i| self.graph.registry.binder(i).id().label())
                .collect();
            warn!(cycle = ?chain, "Circular dependency detected");
            return Err(RabtError::CircularDependency(CircularDependencyError { chain }));
        }

        self.visiting.insert(index);
        self.path.push(index);

        for &dependency in &self.graph.edges[index] {
            self.visit(dependency)?;
        }

        self.path.pop();
        self.visiting.remove(&index);
        self.validated.insert(index);
        Ok(())
    }
}
