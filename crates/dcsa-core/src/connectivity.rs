//! Connected components with reversible temporary edits.
//!
//! Contingency analysis needs to ask "which buses are still attached to the
//! reference bus if these branches open?" thousands of times. The
//! [`GraphConnectivity`] trait captures the protocol: open a temporary-change
//! scope, remove or add edges, query component membership, then undo the scope.
//! Scopes nest and are undone in LIFO order; after an undo, every component
//! number is exactly what it was before the scope opened.
//!
//! [`NaiveGraphConnectivity`] is the reference implementation: it recomputes
//! components with a union-find on demand and caches the result until the
//! next edit.
//!
//! ```
//! use dcsa_core::connectivity::{GraphConnectivity, NaiveGraphConnectivity, TemporaryChanges};
//!
//! let mut graph = NaiveGraphConnectivity::new();
//! for v in 0..3 {
//!     graph.add_vertex(v);
//! }
//! graph.add_edge(0, 1, 'a').unwrap();
//! graph.add_edge(1, 2, 'b').unwrap();
//! graph.set_main_component_vertex(0).unwrap();
//!
//! {
//!     let mut scope = TemporaryChanges::open(&mut graph);
//!     scope.remove_edge(&'b').unwrap();
//!     assert_eq!(scope.nb_connected_components(), 2);
//!     assert!(scope.vertices_removed_from_main_component().contains(&2));
//! }
//! assert_eq!(graph.nb_connected_components(), 1);
//! ```

use crate::{GridError, GridResult};
use petgraph::unionfind::UnionFind;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

/// Connectivity capability consumed by the contingency engine.
pub trait GraphConnectivity {
    type Vertex;
    type Edge;

    fn add_vertex(&mut self, vertex: Self::Vertex);

    fn add_edge(
        &mut self,
        vertex1: Self::Vertex,
        vertex2: Self::Vertex,
        edge: Self::Edge,
    ) -> GridResult<()>;

    fn remove_edge(&mut self, edge: &Self::Edge) -> GridResult<()>;

    fn contains_edge(&self, edge: &Self::Edge) -> bool;

    /// Opens a nested temporary-change scope.
    fn start_temporary_changes(&mut self);

    /// Reverts every edit made since the matching [`start_temporary_changes`].
    ///
    /// [`start_temporary_changes`]: GraphConnectivity::start_temporary_changes
    fn undo_temporary_changes(&mut self) -> GridResult<()>;

    /// Component number of a vertex; 0 is the main component.
    fn component_number(&mut self, vertex: &Self::Vertex) -> GridResult<usize>;

    fn nb_connected_components(&mut self) -> usize;

    /// Vertex whose component is numbered 0 (the reference bus).
    fn set_main_component_vertex(&mut self, vertex: Self::Vertex) -> GridResult<()>;

    /// Vertices that belonged to the main component when the innermost scope
    /// opened and no longer do.
    fn vertices_removed_from_main_component(&mut self) -> HashSet<Self::Vertex>;

    /// Edges still in the graph that touch a vertex removed from the main
    /// component.
    fn edges_removed_from_main_component(&mut self) -> HashSet<Self::Edge>;
}

#[derive(Debug, Clone)]
enum Change<E> {
    EdgeRemoved { edge: E, ends: (usize, usize) },
    EdgeAdded { edge: E },
}

#[derive(Debug, Clone)]
struct Scope<E> {
    changes: Vec<Change<E>>,
    main_component: HashSet<usize>,
}

/// Union-find recomputation of components, cached between edits.
#[derive(Debug, Clone)]
pub struct NaiveGraphConnectivity<V, E> {
    vertices: Vec<V>,
    vertex_index: HashMap<V, usize>,
    edges: HashMap<E, (usize, usize)>,
    main_vertex: Option<usize>,
    scopes: Vec<Scope<E>>,
    components: Option<Vec<usize>>,
}

impl<V, E> Default for NaiveGraphConnectivity<V, E> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            vertex_index: HashMap::new(),
            edges: HashMap::new(),
            main_vertex: None,
            scopes: Vec::new(),
            components: None,
        }
    }
}

impl<V, E> NaiveGraphConnectivity<V, E>
where
    V: Copy + Eq + Hash + Debug,
    E: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open temporary-change scopes.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    fn index_of(&self, vertex: &V) -> GridResult<usize> {
        self.vertex_index
            .get(vertex)
            .copied()
            .ok_or_else(|| GridError::Network(format!("unknown vertex {:?}", vertex)))
    }

    fn record(&mut self, change: Change<E>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.changes.push(change);
        }
    }

    fn components(&mut self) -> &[usize] {
        if self.components.is_none() {
            self.components = Some(self.compute_components());
        }
        self.components.as_deref().unwrap_or(&[])
    }

    /// Component numbers: main component first, then the others by decreasing
    /// size, ties broken by their lowest vertex index.
    fn compute_components(&self) -> Vec<usize> {
        let n = self.vertices.len();
        let mut uf = UnionFind::<usize>::new(n);
        for &(v1, v2) in self.edges.values() {
            uf.union(v1, v2);
        }

        let mut roots: HashMap<usize, (usize, usize)> = HashMap::new(); // root -> (size, min vertex)
        for v in 0..n {
            let entry = roots.entry(uf.find(v)).or_insert((0, v));
            entry.0 += 1;
            entry.1 = entry.1.min(v);
        }

        let main_root = self.main_vertex.map(|v| uf.find(v));
        let mut ordered: Vec<(usize, usize, usize)> = roots
            .into_iter()
            .map(|(root, (size, min_vertex))| (root, size, min_vertex))
            .collect();
        ordered.sort_by(|a, b| {
            let a_main = Some(a.0) == main_root;
            let b_main = Some(b.0) == main_root;
            b_main
                .cmp(&a_main)
                .then(b.1.cmp(&a.1))
                .then(a.2.cmp(&b.2))
        });

        let numbering: HashMap<usize, usize> = ordered
            .iter()
            .enumerate()
            .map(|(number, (root, _, _))| (*root, number))
            .collect();
        (0..n).map(|v| numbering[&uf.find(v)]).collect()
    }

    fn main_component_vertices(&mut self) -> HashSet<usize> {
        self.components()
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == 0)
            .map(|(v, _)| v)
            .collect()
    }
}

impl<V, E> GraphConnectivity for NaiveGraphConnectivity<V, E>
where
    V: Copy + Eq + Hash + Debug,
    E: Copy + Eq + Hash + Debug,
{
    type Vertex = V;
    type Edge = E;

    fn add_vertex(&mut self, vertex: V) {
        if self.vertex_index.contains_key(&vertex) {
            return;
        }
        self.vertex_index.insert(vertex, self.vertices.len());
        self.vertices.push(vertex);
        self.components = None;
    }

    fn add_edge(&mut self, vertex1: V, vertex2: V, edge: E) -> GridResult<()> {
        if self.edges.contains_key(&edge) {
            return Err(GridError::Network(format!("edge {:?} already present", edge)));
        }
        let ends = (self.index_of(&vertex1)?, self.index_of(&vertex2)?);
        self.edges.insert(edge, ends);
        self.record(Change::EdgeAdded { edge });
        self.components = None;
        Ok(())
    }

    fn remove_edge(&mut self, edge: &E) -> GridResult<()> {
        let ends = self
            .edges
            .remove(edge)
            .ok_or_else(|| GridError::Network(format!("unknown edge {:?}", edge)))?;
        self.record(Change::EdgeRemoved { edge: *edge, ends });
        self.components = None;
        Ok(())
    }

    fn contains_edge(&self, edge: &E) -> bool {
        self.edges.contains_key(edge)
    }

    fn start_temporary_changes(&mut self) {
        let main_component = self.main_component_vertices();
        self.scopes.push(Scope {
            changes: Vec::new(),
            main_component,
        });
    }

    fn undo_temporary_changes(&mut self) -> GridResult<()> {
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| GridError::Network("no temporary changes to undo".to_string()))?;
        for change in scope.changes.into_iter().rev() {
            match change {
                Change::EdgeRemoved { edge, ends } => {
                    self.edges.insert(edge, ends);
                }
                Change::EdgeAdded { edge } => {
                    self.edges.remove(&edge);
                }
            }
        }
        self.components = None;
        Ok(())
    }

    fn component_number(&mut self, vertex: &V) -> GridResult<usize> {
        let index = self.index_of(vertex)?;
        Ok(self.components()[index])
    }

    fn nb_connected_components(&mut self) -> usize {
        self.components()
            .iter()
            .copied()
            .max()
            .map(|max| max + 1)
            .unwrap_or(0)
    }

    fn set_main_component_vertex(&mut self, vertex: V) -> GridResult<()> {
        self.main_vertex = Some(self.index_of(&vertex)?);
        self.components = None;
        Ok(())
    }

    fn vertices_removed_from_main_component(&mut self) -> HashSet<V> {
        let before = match self.scopes.last() {
            Some(scope) => scope.main_component.clone(),
            None => return HashSet::new(),
        };
        let components = self.components().to_vec();
        before
            .into_iter()
            .filter(|&v| components[v] != 0)
            .map(|v| self.vertices[v])
            .collect()
    }

    fn edges_removed_from_main_component(&mut self) -> HashSet<E> {
        let removed: HashSet<usize> = self
            .vertices_removed_from_main_component()
            .iter()
            .filter_map(|v| self.vertex_index.get(v).copied())
            .collect();
        self.edges
            .iter()
            .filter(|(_, (v1, v2))| removed.contains(v1) || removed.contains(v2))
            .map(|(edge, _)| *edge)
            .collect()
    }
}

/// RAII temporary-change scope: opened on construction, undone on drop.
pub struct TemporaryChanges<'a, C: GraphConnectivity> {
    inner: &'a mut C,
}

impl<'a, C: GraphConnectivity> TemporaryChanges<'a, C> {
    pub fn open(connectivity: &'a mut C) -> Self {
        connectivity.start_temporary_changes();
        Self {
            inner: connectivity,
        }
    }
}

impl<C: GraphConnectivity> Deref for TemporaryChanges<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.inner
    }
}

impl<C: GraphConnectivity> DerefMut for TemporaryChanges<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.inner
    }
}

impl<C: GraphConnectivity> Drop for TemporaryChanges<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.inner.undo_temporary_changes() {
            tracing::error!("failed to undo temporary connectivity changes: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0 - 1 - 2 - 3 with a chord 0 - 2 and a pendant 4 hanging off 3
    fn sample() -> NaiveGraphConnectivity<usize, &'static str> {
        let mut graph = NaiveGraphConnectivity::new();
        for v in 0..5 {
            graph.add_vertex(v);
        }
        graph.add_edge(0, 1, "a").unwrap();
        graph.add_edge(1, 2, "b").unwrap();
        graph.add_edge(2, 3, "c").unwrap();
        graph.add_edge(0, 2, "d").unwrap();
        graph.add_edge(3, 4, "e").unwrap();
        graph.set_main_component_vertex(0).unwrap();
        graph
    }

    fn numbering(graph: &mut NaiveGraphConnectivity<usize, &'static str>) -> Vec<usize> {
        (0..5).map(|v| graph.component_number(&v).unwrap()).collect()
    }

    #[test]
    fn connected_graph_has_single_component() {
        let mut graph = sample();
        assert_eq!(graph.nb_connected_components(), 1);
        assert_eq!(numbering(&mut graph), vec![0; 5]);
    }

    #[test]
    fn removing_bridge_splits_and_reports_lost_elements() {
        let mut graph = sample();
        graph.start_temporary_changes();
        graph.remove_edge(&"c").unwrap();

        assert_eq!(graph.nb_connected_components(), 2);
        assert_eq!(graph.component_number(&3).unwrap(), 1);
        let lost = graph.vertices_removed_from_main_component();
        assert_eq!(lost, HashSet::from([3, 4]));
        assert_eq!(graph.edges_removed_from_main_component(), HashSet::from(["e"]));

        graph.undo_temporary_changes().unwrap();
        assert_eq!(graph.nb_connected_components(), 1);
    }

    #[test]
    fn undo_restores_numbering_exactly() {
        let mut graph = sample();
        let before = numbering(&mut graph);

        graph.start_temporary_changes();
        graph.remove_edge(&"e").unwrap();
        graph.remove_edge(&"a").unwrap();
        graph.remove_edge(&"d").unwrap();
        graph.add_edge(4, 1, "f").unwrap();
        assert_ne!(numbering(&mut graph), before);
        graph.undo_temporary_changes().unwrap();

        assert_eq!(numbering(&mut graph), before);
        assert!(!graph.contains_edge(&"f"));
        assert!(graph.contains_edge(&"a"));
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let mut graph = sample();
        graph.start_temporary_changes();
        graph.remove_edge(&"c").unwrap();
        graph.start_temporary_changes();
        graph.remove_edge(&"a").unwrap();
        assert_eq!(graph.scope_depth(), 2);

        graph.undo_temporary_changes().unwrap();
        assert!(graph.contains_edge(&"a"));
        assert!(!graph.contains_edge(&"c"));
        graph.undo_temporary_changes().unwrap();
        assert!(graph.contains_edge(&"c"));
        assert!(graph.undo_temporary_changes().is_err());
    }

    #[test]
    fn guard_undoes_on_drop() {
        let mut graph = sample();
        {
            let mut scope = TemporaryChanges::open(&mut graph);
            scope.remove_edge(&"e").unwrap();
            assert_eq!(scope.component_number(&4).unwrap(), 1);
        }
        assert_eq!(graph.scope_depth(), 0);
        assert_eq!(graph.component_number(&4).unwrap(), 0);
    }

    #[test]
    fn secondary_components_ordered_by_size() {
        let mut graph = sample();
        graph.start_temporary_changes();
        // isolates {1} and splits {3, 4} off: sizes 1 and 2
        graph.remove_edge(&"a").unwrap();
        graph.remove_edge(&"b").unwrap();
        graph.remove_edge(&"c").unwrap();
        assert_eq!(graph.component_number(&0).unwrap(), 0);
        assert_eq!(graph.component_number(&3).unwrap(), 1);
        assert_eq!(graph.component_number(&1).unwrap(), 2);
    }

    #[test]
    fn unknown_elements_are_errors() {
        let mut graph = sample();
        assert!(graph.remove_edge(&"zz").is_err());
        assert!(graph.component_number(&42).is_err());
        assert!(graph.add_edge(0, 1, "a").is_err());
    }
}
