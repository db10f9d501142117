//! Catalog graph: declared dependencies and the queries the orchestrator needs.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::DeliverableId;
use crate::errors::{CatalogError, CycleDetectedError};

/// Immutable catalog entry for one deliverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// The deliverable.
    pub id: DeliverableId,
    /// Declared upstream dependencies.
    pub dependencies: BTreeSet<DeliverableId>,
    /// Whether the deliverable can be exported outside the project.
    pub exportable: bool,
    /// Whether manual edits are tracked in `edited_fields`.
    pub tracks_edits: bool,
}

impl CatalogEntry {
    /// Position in display order.
    #[must_use]
    pub fn display_order(&self) -> u8 {
        self.id.display_order()
    }
}

/// The static deliverable table with graph queries.
///
/// A `Catalog` can only be obtained through [`CatalogBuilder::build`] or
/// [`Catalog::standard`], so it is acyclic and fully gated by construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: BTreeMap<DeliverableId, CatalogEntry>,
    order: Vec<DeliverableId>,
}

impl Catalog {
    /// Returns a builder for restricted or custom catalogs.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// The full production catalog.
    #[must_use]
    pub fn standard() -> Self {
        use DeliverableId as D;

        let foundation = [D::Profile, D::Framework];
        let mut entries = BTreeMap::new();
        let mut add = |id: D, deps: &[D], exportable: bool, tracks_edits: bool| {
            entries.insert(
                id,
                CatalogEntry {
                    id,
                    dependencies: deps.iter().copied().collect(),
                    exportable,
                    tracks_edits,
                },
            );
        };

        add(D::Preflight, &[], false, false);
        add(D::Profile, &[D::Preflight], true, true);
        add(D::Framework, &[D::Profile], true, true);
        for id in [
            D::Curriculum,
            D::LessonScripts,
            D::Workbook,
            D::LandingPage,
            D::EmailSequence,
            D::Timeline,
        ] {
            add(id, &foundation, true, true);
        }
        add(
            D::QualityReport,
            &[
                D::Profile,
                D::Framework,
                D::Curriculum,
                D::LessonScripts,
                D::Workbook,
                D::LandingPage,
                D::EmailSequence,
                D::Timeline,
            ],
            false,
            false,
        );

        // The table above satisfies every builder check (see tests).
        let order = topological_sort(&entries);
        Self { entries, order }
    }

    /// Declared dependencies of a deliverable (empty if not in the catalog).
    #[must_use]
    pub fn dependencies_of(&self, id: DeliverableId) -> BTreeSet<DeliverableId> {
        self.entries
            .get(&id)
            .map(|e| e.dependencies.clone())
            .unwrap_or_default()
    }

    /// All deliverables in dependency order.
    #[must_use]
    pub fn topological_order(&self) -> &[DeliverableId] {
        &self.order
    }

    /// Every deliverable that depends on `id`, directly or transitively.
    #[must_use]
    pub fn transitive_dependents(&self, id: DeliverableId) -> BTreeSet<DeliverableId> {
        let mut result = BTreeSet::new();
        let mut frontier = vec![id];

        while let Some(current) = frontier.pop() {
            for entry in self.entries.values() {
                if entry.dependencies.contains(&current) && result.insert(entry.id) {
                    frontier.push(entry.id);
                }
            }
        }

        result
    }

    /// The stages a regeneration of `id` touches, in topological order.
    #[must_use]
    pub fn execution_set(&self, id: DeliverableId, cascade: bool) -> Vec<DeliverableId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut selected = BTreeSet::from([id]);
        if cascade {
            selected.extend(self.transitive_dependents(id));
        }
        self.order
            .iter()
            .copied()
            .filter(|d| selected.contains(d))
            .collect()
    }

    /// Looks up a catalog entry.
    #[must_use]
    pub fn entry(&self, id: DeliverableId) -> Option<&CatalogEntry> {
        self.entries.get(&id)
    }

    /// True when the deliverable is part of this catalog.
    #[must_use]
    pub fn contains(&self, id: DeliverableId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Exportable deliverables in display order.
    #[must_use]
    pub fn exportable(&self) -> Vec<DeliverableId> {
        self.entries
            .values()
            .filter(|e| e.exportable)
            .map(|e| e.id)
            .collect()
    }

    /// Number of deliverables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the catalog has no entries (never the case for a built catalog).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builder that validates a catalog definition.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: BTreeMap<DeliverableId, CatalogEntry>,
}

impl CatalogBuilder {
    /// Adds (or replaces) an entry.
    #[must_use]
    pub fn entry(
        mut self,
        id: DeliverableId,
        dependencies: &[DeliverableId],
        exportable: bool,
    ) -> Self {
        self.entries.insert(
            id,
            CatalogEntry {
                id,
                dependencies: dependencies.iter().copied().collect(),
                exportable,
                tracks_edits: exportable,
            },
        );
        self
    }

    /// Overrides edit tracking for an already-added entry.
    #[must_use]
    pub fn tracks_edits(mut self, id: DeliverableId, tracks: bool) -> Self {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.tracks_edits = tracks;
        }
        self
    }

    /// Validates and builds the catalog.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        if self.entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let readiness = DeliverableId::Preflight;
        match self.entries.get(&readiness) {
            None => return Err(CatalogError::MissingReadinessStage(readiness)),
            Some(entry) if !entry.dependencies.is_empty() => {
                return Err(CatalogError::GatedReadinessStage(readiness));
            }
            Some(_) => {}
        }

        for entry in self.entries.values() {
            if entry.id.is_readiness_check() {
                continue;
            }
            if entry.dependencies.is_empty() {
                return Err(CatalogError::UngatedDeliverable(entry.id));
            }
            for dep in &entry.dependencies {
                if *dep == entry.id {
                    return Err(CatalogError::SelfDependency(entry.id));
                }
                if !self.entries.contains_key(dep) {
                    return Err(CatalogError::UnknownDependency {
                        deliverable: entry.id,
                        dependency: *dep,
                    });
                }
            }
        }

        detect_cycle(&self.entries)?;

        let order = topological_sort(&self.entries);
        Ok(Catalog {
            entries: self.entries,
            order,
        })
    }
}

/// Finds the first cycle, returning its path with the start repeated at the end.
fn detect_cycle(entries: &BTreeMap<DeliverableId, CatalogEntry>) -> Result<(), CycleDetectedError> {
    fn dfs(
        node: DeliverableId,
        entries: &BTreeMap<DeliverableId, CatalogEntry>,
        visited: &mut HashSet<DeliverableId>,
        path: &mut Vec<DeliverableId>,
    ) -> Result<(), Vec<DeliverableId>> {
        if let Some(start) = path.iter().position(|n| *n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(cycle);
        }
        if visited.contains(&node) {
            return Ok(());
        }

        path.push(node);
        if let Some(entry) = entries.get(&node) {
            for dep in &entry.dependencies {
                dfs(*dep, entries, visited, path)?;
            }
        }
        path.pop();
        visited.insert(node);
        Ok(())
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    for id in entries.keys() {
        dfs(*id, entries, &mut visited, &mut path).map_err(CycleDetectedError::new)?;
    }
    Ok(())
}

/// Depth-first topological sort visiting roots in display order.
///
/// Assumes the graph is acyclic.
fn topological_sort(entries: &BTreeMap<DeliverableId, CatalogEntry>) -> Vec<DeliverableId> {
    fn visit(
        node: DeliverableId,
        entries: &BTreeMap<DeliverableId, CatalogEntry>,
        visited: &mut HashSet<DeliverableId>,
        result: &mut Vec<DeliverableId>,
    ) {
        if !visited.insert(node) {
            return;
        }
        if let Some(entry) = entries.get(&node) {
            for dep in &entry.dependencies {
                visit(*dep, entries, visited, result);
            }
        }
        result.push(node);
    }

    let mut result = Vec::with_capacity(entries.len());
    let mut visited = HashSet::new();
    for id in entries.keys() {
        visit(*id, entries, &mut visited, &mut result);
    }
    result
}
