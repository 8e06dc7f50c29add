//! Finite-difference checks of the analytic compliance gradient.
//!
//! A 3x2 grid cantilever is evaluated at a random design and every component
//! of `dC/dA` is compared against a central difference
//!
//!     dC/dA_i  ≈  [ C(A + h eᵢ) − C(A − h eᵢ) ] / 2h
//!
//! A directional check then confirms the first-order remainder shrinks
//! quadratically with the step.

use approx::assert_relative_eq;
use hematite::{
    datatypes::{DesignBounds, Geometry, LoadCase},
    mesher::mesh_grid,
    optimizer::{ComplianceProblem, NlpProblem},
    sensitivity::Evaluator,
    solver::ExactSolver,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn cantilever() -> (Geometry, LoadCase) {
    let (nodes, bars) = mesh_grid((0.0, 0.0), (3.0, 2.0), 3, 2).unwrap();
    let geometry = Geometry::new(nodes, bars).unwrap();
    let load_case = LoadCase::uniform(&geometry, 100.0)
        .unwrap()
        .fix(0, [true, true])
        .unwrap()
        .fix(4, [true, true])
        .unwrap()
        .fix(8, [true, true])
        .unwrap()
        .apply_load(7, [0.3, -1.0])
        .unwrap()
        .apply_load(11, [0.0, -0.5])
        .unwrap();
    (geometry, load_case)
}

fn random_design(bars: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..bars).map(|_| rng.gen_range(0.5..1.5)).collect()
}

#[test]
fn gradient_matches_central_differences() {
    let (geometry, load_case) = cantilever();
    let evaluator = Evaluator::new(&geometry, &load_case, ExactSolver);
    let x = random_design(geometry.bar_count(), 11);
    let analytic = evaluator.evaluate(&x).unwrap().gradient;

    for i in 0..x.len() {
        let h = 1e-6 * x[i];
        let mut plus = x.clone();
        plus[i] += h;
        let mut minus = x.clone();
        minus[i] -= h;

        let c_plus = evaluator.evaluate(&plus).unwrap().compliance;
        let c_minus = evaluator.evaluate(&minus).unwrap().compliance;
        let numeric = (c_plus - c_minus) / (2.0 * h);

        assert_relative_eq!(analytic[i], numeric, max_relative = 1e-5, epsilon = 1e-9);
    }
}

#[test]
fn directional_remainder_is_second_order() {
    let (geometry, load_case) = cantilever();
    let evaluator = Evaluator::new(&geometry, &load_case, ExactSolver);
    let x = random_design(geometry.bar_count(), 23);
    let direction = random_design(geometry.bar_count(), 29)
        .iter()
        .map(|d| d - 1.0)
        .collect::<Vec<f64>>();

    let base = evaluator.evaluate(&x).unwrap();
    let slope: f64 = base.gradient.iter().zip(&direction).map(|(g, d)| g * d).sum();

    let remainder = |t: f64| {
        let shifted: Vec<f64> = x.iter().zip(&direction).map(|(a, d)| a + t * d).collect();
        let compliance = evaluator.evaluate(&shifted).unwrap().compliance;
        (compliance - base.compliance - t * slope).abs()
    };

    let coarse = remainder(1e-2);
    let fine = remainder(1e-3);
    // a first-order error would only shrink tenfold
    assert!(fine < coarse / 50.0, "coarse {coarse:e}, fine {fine:e}");
}

#[test]
fn volume_constraint_gradient_matches_differences() {
    let (geometry, load_case) = cantilever();
    let bounds = DesignBounds::uniform(geometry.bar_count(), 0.1, 2.0).unwrap();
    let problem = ComplianceProblem::new(
        Evaluator::new(&geometry, &load_case, ExactSolver),
        &bounds,
        0.5,
    )
    .unwrap();
    let x = random_design(geometry.bar_count(), 5);
    let analytic = problem.constraint_gradient(&x);

    for i in 0..x.len() {
        let mut plus = x.clone();
        plus[i] += 1e-3;
        let numeric = (problem.constraint(&plus) - problem.constraint(&x)) / 1e-3;
        assert_relative_eq!(analytic[i], numeric, max_relative = 1e-8);
    }
}
