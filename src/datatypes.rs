use std::collections::HashSet;

use nalgebra::{DVector, Matrix2, Vector2};

use crate::error::TrussError;

/// Displacement components per node
pub const DOF: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }
}

/// A pin-jointed bar between two node ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bar {
    pub nodes: [usize; 2],
}

impl Bar {
    pub fn new(a: usize, b: usize) -> Bar {
        Bar { nodes: [a, b] }
    }

    /// Checks if the bar joins `a` and `b`, in either direction
    pub fn connects(&self, a: usize, b: usize) -> bool {
        (self.nodes[0] == a && self.nodes[1] == b) || (self.nodes[0] == b && self.nodes[1] == a)
    }

    pub fn touches(&self, node: usize) -> bool {
        self.nodes[0] == node || self.nodes[1] == node
    }

    fn key(&self) -> (usize, usize) {
        (
            self.nodes[0].min(self.nodes[1]),
            self.nodes[0].max(self.nodes[1]),
        )
    }
}

/// Immutable node and bar arenas plus the per-bar geometry derived from them.
///
/// Node ids index `nodes`, bar ids index `bars`. Every per-bar vector in the
/// crate (design areas, moduli, stresses, gradients) is addressed by bar id,
/// so the order given at construction is preserved and never changed.
#[derive(Debug, Clone)]
pub struct Geometry {
    nodes: Vec<Vertex>,
    bars: Vec<Bar>,
    lengths: Vec<f64>,
    cosines: Vec<Vector2<f64>>,
    transforms: Vec<Matrix2<f64>>,
}

impl Geometry {
    /// Validates the topology and caches lengths, direction cosines and the
    /// `e ⊗ e` transformation block of every bar
    ///
    /// # Arguments
    /// * `nodes` - Node coordinates, index = node id
    /// * `bars` - Bar connectivity, index = bar id
    ///
    /// # Returns
    /// The geometry, or a `TrussError::Geometry` for dangling node references,
    /// self-loops, duplicate bars and zero-length bars
    pub fn new(nodes: Vec<Vertex>, bars: Vec<Bar>) -> Result<Geometry, TrussError> {
        if bars.is_empty() {
            return Err(TrussError::Geometry("Topology has no bars".to_owned()));
        }

        let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(bars.len());
        let mut lengths = Vec::with_capacity(bars.len());
        let mut cosines = Vec::with_capacity(bars.len());
        let mut transforms = Vec::with_capacity(bars.len());

        for (id, bar) in bars.iter().enumerate() {
            let [a, b] = bar.nodes;
            if a >= nodes.len() || b >= nodes.len() {
                return Err(TrussError::Geometry(format!(
                    "Bar {id} references node ({a}, {b}) but only {} nodes exist",
                    nodes.len()
                )));
            }
            if a == b {
                return Err(TrussError::Geometry(format!(
                    "Bar {id} is a self-loop on node {a}"
                )));
            }
            if !seen.insert(bar.key()) {
                return Err(TrussError::Geometry(format!(
                    "Bar {id} duplicates an earlier bar between nodes {a} and {b}"
                )));
            }

            let vector = Vector2::new(nodes[b].x - nodes[a].x, nodes[b].y - nodes[a].y);
            let length = vector.norm();
            if length <= 0.0 || !length.is_finite() {
                return Err(TrussError::Geometry(format!(
                    "Bar {id} between nodes {a} and {b} has degenerate length {length}"
                )));
            }

            let cosine = vector / length;
            lengths.push(length);
            transforms.push(cosine * cosine.transpose());
            cosines.push(cosine);
        }

        Ok(Geometry {
            nodes,
            bars,
            lengths,
            cosines,
            transforms,
        })
    }

    pub fn nodes(&self) -> &[Vertex] {
        &self.nodes
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// Total number of displacement components, constrained or not
    pub fn dof_count(&self) -> usize {
        DOF * self.nodes.len()
    }

    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    pub fn cosine(&self, bar: usize) -> &Vector2<f64> {
        &self.cosines[bar]
    }

    pub fn transform(&self, bar: usize) -> &Matrix2<f64> {
        &self.transforms[bar]
    }

    /// Checks that a per-bar vector lines up with the bar arena
    pub fn check_bar_vector(&self, name: &str, values: &[f64]) -> Result<(), TrussError> {
        if values.len() != self.bars.len() {
            return Err(TrussError::Geometry(format!(
                "{name} has {} entries but the truss has {} bars",
                values.len(),
                self.bars.len()
            )));
        }
        Ok(())
    }
}

/// Material, loads and supports applied to a geometry.
///
/// `loads` and `free` have one row per node. Loads at constrained DOFs are
/// kept since compliance sums over every DOF.
#[derive(Debug, Clone)]
pub struct LoadCase {
    youngs_modulus: Vec<f64>,
    loads: Vec<[f64; DOF]>,
    free: Vec<[bool; DOF]>,
    free_dofs: Vec<usize>,
}

impl LoadCase {
    pub fn new(
        geometry: &Geometry,
        youngs_modulus: Vec<f64>,
        loads: Vec<[f64; DOF]>,
        free: Vec<[bool; DOF]>,
    ) -> Result<LoadCase, TrussError> {
        geometry.check_bar_vector("Young's modulus vector", &youngs_modulus)?;
        if let Some(bar) = youngs_modulus.iter().position(|e| *e <= 0.0 || !e.is_finite()) {
            return Err(TrussError::Geometry(format!(
                "Bar {bar} has non-positive Young's modulus {}",
                youngs_modulus[bar]
            )));
        }
        if loads.len() != geometry.node_count() {
            return Err(TrussError::Geometry(format!(
                "Load matrix has {} rows but the truss has {} nodes",
                loads.len(),
                geometry.node_count()
            )));
        }
        if free.len() != geometry.node_count() {
            return Err(TrussError::Geometry(format!(
                "Free-DOF mask has {} rows but the truss has {} nodes",
                free.len(),
                geometry.node_count()
            )));
        }

        let free_dofs = collect_free_dofs(&free)?;

        Ok(LoadCase {
            youngs_modulus,
            loads,
            free,
            free_dofs,
        })
    }

    /// A load case with uniform modulus, no loads and every DOF free. Use
    /// `fix` and `apply_load` to finish it.
    pub fn uniform(geometry: &Geometry, youngs_modulus: f64) -> Result<LoadCase, TrussError> {
        let nodes = geometry.node_count();
        LoadCase::new(
            geometry,
            vec![youngs_modulus; geometry.bar_count()],
            vec![[0.0; DOF]; nodes],
            vec![[true; DOF]; nodes],
        )
    }

    /// Constrains the selected axes of `node`
    pub fn fix(mut self, node: usize, axes: [bool; DOF]) -> Result<LoadCase, TrussError> {
        let row = self.free.get_mut(node).ok_or_else(|| {
            TrussError::Geometry(format!("Cannot fix unknown node {node}"))
        })?;
        for (axis, fixed) in axes.iter().enumerate() {
            if *fixed {
                row[axis] = false;
            }
        }
        self.free_dofs = collect_free_dofs(&self.free)?;
        Ok(self)
    }

    /// Adds a force to `node`
    pub fn apply_load(mut self, node: usize, force: [f64; DOF]) -> Result<LoadCase, TrussError> {
        let row = self.loads.get_mut(node).ok_or_else(|| {
            TrussError::Geometry(format!("Cannot load unknown node {node}"))
        })?;
        for axis in 0..DOF {
            row[axis] += force[axis];
        }
        Ok(self)
    }

    pub fn youngs_modulus(&self) -> &[f64] {
        &self.youngs_modulus
    }

    pub fn loads(&self) -> &[[f64; DOF]] {
        &self.loads
    }

    pub fn free_mask(&self) -> &[[bool; DOF]] {
        &self.free
    }

    /// Free DOF indices in row-major order of the mask
    pub fn free_dofs(&self) -> &[usize] {
        &self.free_dofs
    }

    pub fn free_count(&self) -> usize {
        self.free_dofs.len()
    }

    /// Loads flattened over every DOF
    pub fn load_vector(&self) -> DVector<f64> {
        DVector::from_iterator(
            DOF * self.loads.len(),
            self.loads.iter().flat_map(|row| row.iter().copied()),
        )
    }

    /// Loads at the free DOFs only
    pub fn reduced_loads(&self) -> DVector<f64> {
        let full = self.load_vector();
        DVector::from_iterator(self.free_dofs.len(), self.free_dofs.iter().map(|dof| full[*dof]))
    }
}

/// Per-bar area bounds, `0 < lower < upper`
#[derive(Debug, Clone, PartialEq)]
pub struct DesignBounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl DesignBounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<DesignBounds, TrussError> {
        if lower.len() != upper.len() {
            return Err(TrussError::Input(format!(
                "Lower bounds have {} entries but upper bounds have {}",
                lower.len(),
                upper.len()
            )));
        }
        for (bar, (lo, hi)) in lower.iter().zip(&upper).enumerate() {
            if *lo <= 0.0 || !hi.is_finite() || lo >= hi {
                return Err(TrussError::Input(format!(
                    "Bar {bar} needs 0 < area_min < area_max, got [{lo}, {hi}]"
                )));
            }
        }
        Ok(DesignBounds { lower, upper })
    }

    /// The same bounds for every bar
    pub fn uniform(bars: usize, min: f64, max: f64) -> Result<DesignBounds, TrussError> {
        DesignBounds::new(vec![min; bars], vec![max; bars])
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn contains(&self, design: &[f64]) -> bool {
        design.len() == self.len()
            && design
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(x, (lo, hi))| x >= lo && x <= hi)
    }

    /// Maps a point of the unit hypercube onto the box
    pub fn from_unit(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(u, (lo, hi))| (lo + u * (hi - lo)).clamp(*lo, *hi))
            .collect()
    }
}

/// Free DOF indices of a mask, row-major: node 0 x, node 0 y, node 1 x, ...
fn collect_free_dofs(free: &[[bool; DOF]]) -> Result<Vec<usize>, TrussError> {
    let free_dofs: Vec<usize> = free
        .iter()
        .flatten()
        .enumerate()
        .filter(|(_, is_free)| **is_free)
        .map(|(dof, _)| dof)
        .collect();

    if free_dofs.is_empty() {
        return Err(TrussError::Geometry(
            "Every degree of freedom is constrained".to_owned(),
        ));
    }
    Ok(free_dofs)
}

/// Displacement of `node` taken from a flattened field
pub fn node_displacement(field: &DVector<f64>, node: usize) -> Vector2<f64> {
    Vector2::new(field[DOF * node], field[DOF * node + 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> (Vec<Vertex>, Vec<Bar>) {
        (
            vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(3.0, 0.0),
                Vertex::new(0.0, 4.0),
            ],
            vec![Bar::new(0, 1), Bar::new(1, 2), Bar::new(2, 0)],
        )
    }

    #[test]
    fn caches_lengths_and_cosines() {
        let (nodes, bars) = triangle();
        let geometry = Geometry::new(nodes, bars).unwrap();

        assert_eq!(geometry.lengths(), &[3.0, 5.0, 4.0]);
        assert!((geometry.cosine(1).x + 0.6).abs() < 1e-12);
        assert!((geometry.cosine(1).y - 0.8).abs() < 1e-12);

        let b = geometry.transform(1);
        assert!((b[(0, 1)] + 0.48).abs() < 1e-12);
        assert!((b[(0, 1)] - b[(1, 0)]).abs() < 1e-15);
    }

    #[test]
    fn rejects_invalid_topologies() {
        let (nodes, _) = triangle();
        for bars in [
            vec![Bar::new(0, 3)],
            vec![Bar::new(1, 1)],
            vec![Bar::new(0, 1), Bar::new(1, 0)],
            vec![],
        ] {
            assert!(matches!(
                Geometry::new(nodes.clone(), bars),
                Err(TrussError::Geometry(_))
            ));
        }

        let coincident = vec![Vertex::new(1.0, 1.0), Vertex::new(1.0, 1.0)];
        assert!(matches!(
            Geometry::new(coincident, vec![Bar::new(0, 1)]),
            Err(TrussError::Geometry(_))
        ));
    }

    #[test]
    fn free_dofs_follow_row_major_mask() {
        let (nodes, bars) = triangle();
        let geometry = Geometry::new(nodes, bars).unwrap();
        let load_case = LoadCase::uniform(&geometry, 1.0)
            .unwrap()
            .fix(0, [true, true])
            .unwrap()
            .fix(1, [false, true])
            .unwrap()
            .apply_load(2, [0.5, -1.0])
            .unwrap();

        assert_eq!(load_case.free_dofs(), &[2, 4, 5]);
        assert_eq!(load_case.reduced_loads().as_slice(), &[0.0, 0.5, -1.0]);
        assert_eq!(load_case.load_vector().len(), 6);
    }

    #[test]
    fn uniform_load_case_rejects_bad_modulus() {
        let (nodes, bars) = triangle();
        let geometry = Geometry::new(nodes, bars).unwrap();
        for modulus in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                LoadCase::uniform(&geometry, modulus),
                Err(TrussError::Geometry(_))
            ));
        }
        assert_eq!(LoadCase::uniform(&geometry, 2.0).unwrap().free_count(), 6);
    }

    #[test]
    fn bounds_map_unit_cube() {
        let bounds = DesignBounds::uniform(2, 1e-6, 1e-2).unwrap();
        let design = bounds.from_unit(&[0.0, 1.0]);
        assert_eq!(design[0], 1e-6);
        assert!((design[1] - 1e-2).abs() < 1e-15);
        assert!(bounds.contains(&design));
        assert!(!bounds.contains(&[0.0, 1e-3]));

        assert!(DesignBounds::uniform(2, 0.0, 1.0).is_err());
        assert!(DesignBounds::uniform(2, 1.0, 0.5).is_err());
    }

    #[test]
    fn rejects_fully_constrained_and_misshapen_cases() {
        let (nodes, bars) = triangle();
        let geometry = Geometry::new(nodes, bars).unwrap();

        let all_fixed = vec![[false, false]; 3];
        assert!(LoadCase::new(&geometry, vec![1.0; 3], vec![[0.0; 2]; 3], all_fixed).is_err());
        assert!(LoadCase::new(&geometry, vec![1.0; 2], vec![[0.0; 2]; 3], vec![[true; 2]; 3]).is_err());
        assert!(LoadCase::new(&geometry, vec![1.0; 3], vec![[0.0; 2]; 2], vec![[true; 2]; 3]).is_err());
        assert!(LoadCase::new(&geometry, vec![0.0; 3], vec![[0.0; 2]; 3], vec![[true; 2]; 3]).is_err());
    }
}
