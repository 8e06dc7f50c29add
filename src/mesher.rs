use log::{info, warn};

use crate::datatypes::{Bar, Vertex};
use crate::error::TrussError;

/// Outcome of removing a single bar
#[derive(Debug, Clone, PartialEq)]
pub enum BarRemoval {
    /// The new bar set, with exactly one bar fewer
    Removed(Vec<Bar>),
    /// No bar joins the requested nodes; the caller's set is unchanged
    NotFound,
}

/// Builds a braced rectangular grid truss
///
/// Nodes are laid out row by row from `corner1` to `corner2`. Every cell gets
/// a bottom chord, a left post and both diagonals; each row closes with a
/// right post and the top row gets its own chord.
///
/// # Arguments
/// * `corner1` - Lower left corner
/// * `corner2` - Upper right corner
/// * `nx` - Number of cells along x
/// * `ny` - Number of cells along y
///
/// # Returns
/// The nodes and bars of the grid, in that order
pub fn mesh_grid(
    corner1: (f64, f64),
    corner2: (f64, f64),
    nx: usize,
    ny: usize,
) -> Result<(Vec<Vertex>, Vec<Bar>), TrussError> {
    if nx == 0 || ny == 0 {
        return Err(TrussError::Geometry(format!(
            "Grid needs at least one cell in each direction, got {nx} x {ny}"
        )));
    }
    if corner1.0 == corner2.0 || corner1.1 == corner2.1 {
        return Err(TrussError::Geometry(
            "Grid corners must span a non-degenerate rectangle".to_owned(),
        ));
    }

    let xs = linspace(corner1.0, corner2.0, nx + 1);
    let ys = linspace(corner1.1, corner2.1, ny + 1);

    let mut nodes: Vec<Vertex> = Vec::with_capacity((nx + 1) * (ny + 1));
    for y in &ys {
        for x in &xs {
            nodes.push(Vertex::new(*x, *y));
        }
    }

    let mut bars: Vec<Bar> = Vec::with_capacity(4 * nx * ny + ny + nx);
    for j in 0..ny {
        let mut right_post = Bar::new(0, 0);
        for i in 0..nx {
            let n1 = i + j * (nx + 1);
            let n2 = n1 + 1;
            let n3 = n1 + nx + 1;
            let n4 = n3 + 1;
            bars.extend([
                Bar::new(n1, n2),
                Bar::new(n1, n3),
                Bar::new(n1, n4),
                Bar::new(n2, n3),
            ]);
            right_post = Bar::new(n2, n4);
        }
        bars.push(right_post);
    }

    let top_row = ny * (nx + 1);
    for i in 0..nx {
        bars.push(Bar::new(top_row + i, top_row + i + 1));
    }

    info!(
        "meshed {}x{} grid with {} nodes and {} bars",
        nx,
        ny,
        nodes.len(),
        bars.len()
    );

    Ok((nodes, bars))
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    let step = (end - start) / (count - 1) as f64;
    (0..count)
        .map(|i| {
            if i == count - 1 {
                end
            } else {
                start + step * i as f64
            }
        })
        .collect()
}

/// Removes the first bar joining `a` and `b`, in either direction
///
/// # Returns
/// `BarRemoval::Removed` with the new bar set, or `BarRemoval::NotFound` if
/// no bar joins the two nodes
pub fn remove_bar(bars: &[Bar], a: usize, b: usize) -> BarRemoval {
    match bars.iter().position(|bar| bar.connects(a, b)) {
        Some(index) => {
            let mut remaining = bars.to_vec();
            remaining.remove(index);
            BarRemoval::Removed(remaining)
        }
        None => {
            warn!("there is no bar between nodes {a} and {b}");
            BarRemoval::NotFound
        }
    }
}

/// Removes every bar touching `node`. Node ids are not renumbered, so the
/// node stays addressable and its supports and loads keep their rows.
pub fn remove_node(bars: &[Bar], node: usize) -> Vec<Bar> {
    let remaining: Vec<Bar> = bars.iter().copied().filter(|bar| !bar.touches(node)).collect();
    if remaining.len() == bars.len() {
        warn!("no bar touches node {node}");
    }
    remaining
}
