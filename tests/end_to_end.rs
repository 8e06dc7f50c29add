//! Whole-pipeline scenarios: mesh, load, solve and optimize.

use std::sync::{atomic::AtomicBool, Arc};

use approx::{assert_abs_diff_eq, assert_relative_eq};
use hematite::{
    datatypes::{Bar, DesignBounds, Geometry, LoadCase, Vertex},
    error::TrussError,
    mesher::mesh_grid,
    optimizer::{optimize, Method, OptimizationSettings, SolverOptions},
    sensitivity::Evaluator,
    solver::ExactSolver,
};

/// 2x1 grid, nodes 0 and 3 pinned, unit downward load at node 5
fn two_by_one() -> (Geometry, LoadCase) {
    let (nodes, bars) = mesh_grid((0.0, 0.0), (2.0, 1.0), 2, 1).unwrap();
    let geometry = Geometry::new(nodes, bars).unwrap();
    let load_case = LoadCase::uniform(&geometry, 1.0)
        .unwrap()
        .fix(0, [true, true])
        .unwrap()
        .fix(3, [true, true])
        .unwrap()
        .apply_load(5, [0.0, -1.0])
        .unwrap();
    (geometry, load_case)
}

/// 6x4 cantilever with the left column pinned and a tip load
fn cantilever() -> (Geometry, LoadCase) {
    let (nodes, bars) = mesh_grid((0.0, 0.0), (0.6, 0.4), 6, 4).unwrap();
    let geometry = Geometry::new(nodes, bars).unwrap();
    let mut load_case = LoadCase::uniform(&geometry, 1e7)
        .unwrap()
        .apply_load(20, [0.0, -100.0])
        .unwrap();
    for node in [0, 7, 14, 21, 28] {
        load_case = load_case.fix(node, [true, true]).unwrap();
    }
    (geometry, load_case)
}

fn settings(bars: usize, method: Method) -> OptimizationSettings {
    OptimizationSettings {
        volume_fraction: 0.1,
        bounds: DesignBounds::uniform(bars, 1e-6, 1e-2).unwrap(),
        x0: vec![1e-4; bars],
        method,
        options: SolverOptions {
            max_iterations: 60,
            ..SolverOptions::default()
        },
    }
}

#[test]
fn two_by_one_grid_deflects_under_load() {
    let (geometry, load_case) = two_by_one();
    assert_eq!(geometry.node_count(), 6);
    assert_eq!(geometry.bar_count(), 11);

    let evaluation = Evaluator::new(&geometry, &load_case, ExactSolver)
        .evaluate(&vec![1.0; geometry.bar_count()])
        .unwrap();

    // node 5, y axis
    assert!(evaluation.displacements[11] < 0.0);
    assert!(evaluation.compliance > 0.0);
    assert_relative_eq!(
        evaluation.compliance,
        -evaluation.displacements[11],
        max_relative = 1e-12
    );
    for dof in [0, 1, 6, 7] {
        assert_eq!(evaluation.displacements[dof], 0.0);
    }
}

#[test]
fn compliance_is_invariant_under_node_relabeling() {
    let (geometry, load_case) = two_by_one();
    let areas = vec![1.0; geometry.bar_count()];
    let original = Evaluator::new(&geometry, &load_case, ExactSolver)
        .evaluate(&areas)
        .unwrap();

    let relabel = [5, 3, 1, 0, 2, 4];
    let mut nodes = vec![Vertex::new(0.0, 0.0); 6];
    for (old, new) in relabel.iter().enumerate() {
        nodes[*new] = geometry.nodes()[old];
    }
    // bars also flipped end to end and listed in reverse
    let bars: Vec<Bar> = geometry
        .bars()
        .iter()
        .rev()
        .map(|bar| Bar::new(relabel[bar.nodes[1]], relabel[bar.nodes[0]]))
        .collect();
    let relabeled = Geometry::new(nodes, bars).unwrap();
    let relabeled_case = LoadCase::uniform(&relabeled, 1.0)
        .unwrap()
        .fix(relabel[0], [true, true])
        .unwrap()
        .fix(relabel[3], [true, true])
        .unwrap()
        .apply_load(relabel[5], [0.0, -1.0])
        .unwrap();

    let permuted = Evaluator::new(&relabeled, &relabeled_case, ExactSolver)
        .evaluate(&areas)
        .unwrap();
    assert_relative_eq!(original.compliance, permuted.compliance, max_relative = 1e-10);
}

#[test]
fn optimality_criteria_improves_compliance_within_volume() {
    let (geometry, load_case) = cantilever();
    let settings = settings(geometry.bar_count(), Method::OptimalityCriteria);

    let start = Evaluator::new(&geometry, &load_case, ExactSolver)
        .evaluate(&settings.x0)
        .unwrap();
    let outcome = optimize(&geometry, &load_case, ExactSolver, &settings).unwrap();

    assert!(outcome.feasible);
    assert!(outcome.evaluation.compliance <= start.compliance);
    assert!(outcome.volume_fraction <= 0.1 + settings.options.feasibility_tolerance);
    assert!(settings.bounds.contains(&outcome.design));
    assert_relative_eq!(outcome.objective, outcome.evaluation.compliance, max_relative = 1e-12);
}

#[test]
fn optimized_design_reports_balancing_reactions() {
    let (geometry, load_case) = cantilever();
    let settings = settings(geometry.bar_count(), Method::OptimalityCriteria);
    let outcome = optimize(&geometry, &load_case, ExactSolver, &settings).unwrap();

    let supports = [0, 7, 14, 21, 28];
    let (mut rx, mut ry) = (0.0, 0.0);
    for node in 0..geometry.node_count() {
        if supports.contains(&node) {
            rx += outcome.reactions[2 * node];
            ry += outcome.reactions[2 * node + 1];
        } else {
            assert_eq!(outcome.reactions[2 * node], 0.0);
            assert_eq!(outcome.reactions[2 * node + 1], 0.0);
        }
    }
    // the wall carries the 100 N tip load
    assert_abs_diff_eq!(rx, 0.0, epsilon = 1e-6);
    assert_relative_eq!(ry, 100.0, max_relative = 1e-6);
}

#[test]
fn augmented_lagrangian_improves_compliance_within_volume() {
    let (nodes, bars) = mesh_grid((0.0, 0.0), (0.3, 0.2), 3, 2).unwrap();
    let geometry = Geometry::new(nodes, bars).unwrap();
    let load_case = LoadCase::uniform(&geometry, 1e7)
        .unwrap()
        .fix(0, [true, true])
        .unwrap()
        .fix(4, [true, true])
        .unwrap()
        .fix(8, [true, true])
        .unwrap()
        .apply_load(7, [0.0, -100.0])
        .unwrap();
    let settings = settings(geometry.bar_count(), Method::AugmentedLagrangian);

    let start = Evaluator::new(&geometry, &load_case, ExactSolver)
        .evaluate(&settings.x0)
        .unwrap();
    let outcome = optimize(&geometry, &load_case, ExactSolver, &settings).unwrap();

    assert!(outcome.feasible);
    assert!(outcome.evaluation.compliance <= start.compliance);
    assert!(outcome.volume_fraction <= 0.1 + settings.options.feasibility_tolerance);
}

#[test]
fn infeasible_start_is_reported_before_solving() {
    let (geometry, load_case) = two_by_one();
    let bars = geometry.bar_count();

    let mut too_heavy = settings(bars, Method::OptimalityCriteria);
    too_heavy.x0 = vec![5e-3; bars];
    assert!(matches!(
        optimize(&geometry, &load_case, ExactSolver, &too_heavy),
        Err(TrussError::InfeasibleStart(_))
    ));

    let mut out_of_bounds = settings(bars, Method::OptimalityCriteria);
    out_of_bounds.x0[3] = 1e-8;
    assert!(matches!(
        optimize(&geometry, &load_case, ExactSolver, &out_of_bounds),
        Err(TrussError::InfeasibleStart(_))
    ));
}

#[test]
fn singular_system_aborts_optimization() {
    let (geometry, _) = two_by_one();
    // a single pinned node leaves a rigid-body rotation
    let load_case = LoadCase::uniform(&geometry, 1.0)
        .unwrap()
        .fix(0, [true, true])
        .unwrap()
        .apply_load(5, [0.0, -1.0])
        .unwrap();
    let settings = settings(geometry.bar_count(), Method::OptimalityCriteria);

    assert!(matches!(
        optimize(&geometry, &load_case, ExactSolver, &settings),
        Err(TrussError::SingularSystem(_))
    ));
}

#[test]
fn interrupted_optimization_returns_starting_design() {
    let (geometry, load_case) = two_by_one();
    let mut settings = settings(geometry.bar_count(), Method::OptimalityCriteria);
    settings.options.interrupt = Some(Arc::new(AtomicBool::new(true)));

    let outcome = optimize(&geometry, &load_case, ExactSolver, &settings).unwrap();
    assert!(outcome.interrupted);
    assert!(outcome.feasible);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(outcome.design, settings.x0);
}
