//! Surrogates trained on exact displacements of a 2x1 grid truss.

use hematite::{
    datatypes::{DesignBounds, Geometry, LoadCase},
    error::TrussError,
    mesher::mesh_grid,
    optimizer::{optimize, Method, OptimizationSettings, SolverOptions},
    sensitivity::Evaluator,
    solver::ExactSolver,
    surrogate::{
        generate_training_set, prediction_errors, train_surrogate, MlpRegressor, RbfRegressor,
        Regressor,
        SurrogateConfig, SurrogateModel, SurrogateSolver,
    },
};
use rand::{rngs::StdRng, SeedableRng};

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

#[test]
fn rbf_reproduces_training_displacements() {
    let (geometry, load_case) = two_by_one();
    let bounds = DesignBounds::uniform(geometry.bar_count(), 0.5, 1.5).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let training =
        generate_training_set(&geometry, &load_case, &bounds, 60, &mut rng, false).unwrap();
    let held_out =
        generate_training_set(&geometry, &load_case, &bounds, 20, &mut rng, false).unwrap();
    assert_eq!(training.len(), 60);
    assert_eq!(training.outputs[0].len(), load_case.free_count());

    let (model, _) = RbfRegressor::default()
        .train(&training.inputs, &training.outputs, 0.15, 0)
        .unwrap();

    let (train_mse, _) = prediction_errors(&model, &training.inputs, &training.outputs);
    let (test_mse, _) = prediction_errors(&model, &held_out.inputs, &held_out.outputs);
    assert!(train_mse < test_mse, "train {train_mse:e}, held out {test_mse:e}");

    let exact = &training.outputs[7];
    let predicted = model.predict(training.inputs[7].as_slice());
    assert!((&predicted - exact).amax() < 1e-3 * exact.amax());
}

#[test]
fn surrogate_backed_optimization_runs_end_to_end() {
    let (geometry, load_case) = two_by_one();
    let bars = geometry.bar_count();
    let settings = OptimizationSettings {
        volume_fraction: 0.3,
        bounds: DesignBounds::uniform(bars, 0.05, 1.0).unwrap(),
        x0: vec![0.2; bars],
        method: Method::OptimalityCriteria,
        options: SolverOptions {
            max_iterations: 30,
            ..SolverOptions::default()
        },
    };
    let config = SurrogateConfig {
        samples: 80,
        seed: 9,
        ..SurrogateConfig::default()
    };

    let trained = train_surrogate(
        &geometry,
        &load_case,
        &settings.bounds,
        &config,
        &RbfRegressor::default(),
    )
    .unwrap();
    assert_eq!(trained.report.train_samples, 64);
    assert_eq!(trained.report.test_samples, 16);
    assert!(trained.report.test_mse.is_some());
    assert!(trained.report.test_mae.is_some());

    let surrogate = SurrogateSolver(trained.model);
    let predicted = Evaluator::new(&geometry, &load_case, &surrogate)
        .evaluate(&settings.x0)
        .unwrap();
    let exact = Evaluator::new(&geometry, &load_case, ExactSolver)
        .evaluate(&settings.x0)
        .unwrap();
    assert_eq!(predicted.displacements.len(), exact.displacements.len());
    assert!(predicted.compliance > 0.0);

    let outcome = optimize(&geometry, &load_case, &surrogate, &settings).unwrap();
    assert!(outcome.feasible);
    assert!(outcome.volume_fraction <= 0.3 + settings.options.feasibility_tolerance);
    assert!(outcome.evaluation.compliance > 0.0);
}

#[test]
fn seeded_mlp_surrogate_drives_optimization() {
    let (geometry, load_case) = two_by_one();
    let bars = geometry.bar_count();
    let settings = OptimizationSettings {
        volume_fraction: 0.3,
        bounds: DesignBounds::uniform(bars, 0.05, 1.0).unwrap(),
        x0: vec![0.2; bars],
        method: Method::OptimalityCriteria,
        options: SolverOptions {
            max_iterations: 30,
            ..SolverOptions::default()
        },
    };
    let config = SurrogateConfig {
        samples: 100,
        seed: 4,
        ..SurrogateConfig::default()
    };
    let regressor = MlpRegressor {
        seed: 4,
        ..MlpRegressor::default()
    };

    let run = || {
        let trained =
            train_surrogate(&geometry, &load_case, &settings.bounds, &config, &regressor).unwrap();
        assert_eq!(trained.report.train_samples, 80);
        assert_eq!(trained.report.test_samples, 20);
        assert!(trained.report.train_mse.is_finite());
        optimize(&geometry, &load_case, SurrogateSolver(trained.model), &settings).unwrap()
    };

    let first = run();
    assert!(first.feasible);
    assert!(settings.bounds.contains(&first.design));
    assert!(first.volume_fraction <= 0.3 + settings.options.feasibility_tolerance);
    assert!(first.evaluation.compliance > 0.0);

    let second = run();
    assert_eq!(first.design, second.design);
}

#[test]
fn surrogate_for_another_truss_is_rejected() {
    let (geometry, load_case) = two_by_one();
    let bounds = DesignBounds::uniform(geometry.bar_count(), 0.5, 1.5).unwrap();
    let config = SurrogateConfig {
        samples: 30,
        ..SurrogateConfig::default()
    };
    let trained =
        train_surrogate(&geometry, &load_case, &bounds, &config, &RbfRegressor::default())
            .unwrap();
    let surrogate = SurrogateSolver(trained.model);

    // more bars than the model was trained on
    let (nodes, bars) = mesh_grid((0.0, 0.0), (3.0, 2.0), 3, 2).unwrap();
    let larger = Geometry::new(nodes, bars).unwrap();
    let larger_case = LoadCase::uniform(&larger, 1.0)
        .unwrap()
        .fix(0, [true, true])
        .unwrap()
        .fix(4, [true, true])
        .unwrap()
        .apply_load(7, [0.0, -1.0])
        .unwrap();
    assert!(matches!(
        Evaluator::new(&larger, &larger_case, &surrogate).evaluate(&vec![1.0; larger.bar_count()]),
        Err(TrussError::Surrogate(_))
    ));

    // same bars, one fewer free DOF
    let stiffer_case = load_case.clone().fix(1, [false, true]).unwrap();
    assert!(matches!(
        Evaluator::new(&geometry, &stiffer_case, &surrogate)
            .evaluate(&vec![1.0; geometry.bar_count()]),
        Err(TrussError::Surrogate(_))
    ));

    assert!(Evaluator::new(&geometry, &load_case, &surrogate)
        .evaluate(&vec![1.0; geometry.bar_count()])
        .is_ok());
}

#[test]
fn empty_or_degenerate_sampling_is_rejected() {
    let (geometry, load_case) = two_by_one();
    let bounds = DesignBounds::uniform(geometry.bar_count(), 0.5, 1.5).unwrap();

    let empty = SurrogateConfig {
        samples: 0,
        ..SurrogateConfig::default()
    };
    assert!(matches!(
        train_surrogate(&geometry, &load_case, &bounds, &empty, &RbfRegressor::default()),
        Err(TrussError::Surrogate(_))
    ));

    let bad_ratio = SurrogateConfig {
        test_ratio: 1.5,
        ..SurrogateConfig::default()
    };
    assert!(matches!(
        train_surrogate(&geometry, &load_case, &bounds, &bad_ratio, &RbfRegressor::default()),
        Err(TrussError::Surrogate(_))
    ));

    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        generate_training_set(&geometry, &load_case, &bounds, 0, &mut rng, false),
        Err(TrussError::Surrogate(_))
    ));
}
