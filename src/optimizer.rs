//! Volume-constrained compliance minimization and the NLP solvers that
//! drive it.
//!
//! Problems and solvers meet at two small traits, `NlpProblem` and
//! `NlpSolver`. Both shipped solvers keep the best feasible iterate seen so
//! far, which is what an interrupted run returns.

use std::{
    cell::RefCell,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        CostFunction, Error, Executor, Gradient, State, KV,
    },
    solver::{linesearch::MoreThuenteLineSearch, quasinewton::LBFGS},
};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{debug, info, warn};
use nalgebra::DVector;

use crate::{
    datatypes::{DesignBounds, Geometry, LoadCase},
    error::TrussError,
    sensitivity::{Evaluation, Evaluator},
    solver::{assemble_stiffness, compute_reactions, DisplacementSource, ExactSolver},
};

/// A smooth objective with one inequality constraint `g(x) <= 0` and box
/// bounds
pub trait NlpProblem {
    fn dimension(&self) -> usize;

    /// Objective value and gradient from a single evaluation
    fn objective_and_gradient(&self, x: &[f64]) -> Result<(f64, Vec<f64>), TrussError>;

    fn objective(&self, x: &[f64]) -> Result<f64, TrussError> {
        Ok(self.objective_and_gradient(x)?.0)
    }

    fn gradient(&self, x: &[f64]) -> Result<Vec<f64>, TrussError> {
        Ok(self.objective_and_gradient(x)?.1)
    }

    fn constraint(&self, x: &[f64]) -> f64;

    fn constraint_gradient(&self, x: &[f64]) -> Vec<f64>;

    fn lower_bounds(&self) -> &[f64];

    fn upper_bounds(&self) -> &[f64];
}

/// Settings shared by every `NlpSolver`
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Largest relative design change still counted as converged
    pub tolerance: f64,
    /// Largest constraint value still counted as feasible
    pub feasibility_tolerance: f64,
    /// When set to true the solver stops before its next evaluation
    pub interrupt: Option<Arc<AtomicBool>>,
    pub show_progress: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iterations: 200,
            tolerance: 1e-4,
            feasibility_tolerance: 1e-6,
            interrupt: None,
            show_progress: false,
        }
    }
}

impl SolverOptions {
    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    fn progress_bar(&self, length: usize) -> ProgressBar {
        if self.show_progress {
            ProgressBar::new(length as u64)
        } else {
            ProgressBar::with_draw_target(Some(length as u64), ProgressDrawTarget::hidden())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NlpResult {
    pub x: Vec<f64>,
    pub objective: f64,
    pub constraint: f64,
    pub feasible: bool,
    pub converged: bool,
    pub iterations: usize,
    pub interrupted: bool,
}

pub trait NlpSolver {
    fn name(&self) -> &str;

    /// Minimizes `problem` from `x0`
    ///
    /// Errors raised by the problem abort the solve and are returned as is.
    fn solve(
        &self,
        problem: &dyn NlpProblem,
        x0: &[f64],
        options: &SolverOptions,
    ) -> Result<NlpResult, TrussError>;
}

/// Best feasible point among everything evaluated, plus the latest point as
/// a fallback when nothing feasible was seen
#[derive(Debug, Clone, Default)]
struct IterateTracker {
    feasibility_tolerance: f64,
    best: Option<(Vec<f64>, f64, f64)>,
    last: Option<(Vec<f64>, f64, f64)>,
}

impl IterateTracker {
    fn new(feasibility_tolerance: f64) -> IterateTracker {
        IterateTracker {
            feasibility_tolerance,
            best: None,
            last: None,
        }
    }

    fn offer(&mut self, x: &[f64], objective: f64, constraint: f64) {
        if constraint <= self.feasibility_tolerance
            && objective.is_finite()
            && self.best.as_ref().map_or(true, |(_, f, _)| objective < *f)
        {
            self.best = Some((x.to_vec(), objective, constraint));
        }
        self.last = Some((x.to_vec(), objective, constraint));
    }

    fn finish(
        self,
        converged: bool,
        iterations: usize,
        interrupted: bool,
    ) -> Result<NlpResult, TrussError> {
        let feasible = self.best.is_some();
        let (x, objective, constraint) = self.best.or(self.last).ok_or_else(|| {
            TrussError::Optimizer("Solver finished without evaluating a design".to_owned())
        })?;
        Ok(NlpResult {
            x,
            objective,
            constraint,
            feasible,
            converged,
            iterations,
            interrupted,
        })
    }
}

fn check_start(problem: &dyn NlpProblem, x0: &[f64]) -> Result<(), TrussError> {
    if x0.len() != problem.dimension()
        || problem.lower_bounds().len() != x0.len()
        || problem.upper_bounds().len() != x0.len()
    {
        return Err(TrussError::Optimizer(format!(
            "Problem has dimension {} but the starting point has {} entries",
            problem.dimension(),
            x0.len()
        )));
    }
    Ok(())
}

/// Largest change of any variable relative to its previous magnitude
fn relative_change(previous: &[f64], next: &[f64]) -> f64 {
    previous
        .iter()
        .zip(next)
        .map(|(p, n)| (n - p).abs() / p.abs().max(f64::MIN_POSITIVE))
        .fold(0.0, f64::max)
}

/// Optimality criteria resizing
///
/// Each step scales `x_i` by `sqrt(-df_i / (λ dg_i))`, limited to a move of
/// `move_limit * (ub_i - lb_i)` and clamped to the bounds. The multiplier λ is
/// found by bisection in log space so the resized design satisfies the
/// constraint. Assumes a non-increasing objective and an increasing
/// constraint, which compliance and volume both are.
#[derive(Debug, Clone)]
pub struct OptimalityCriteria {
    pub move_limit: f64,
}

impl Default for OptimalityCriteria {
    fn default() -> Self {
        OptimalityCriteria { move_limit: 0.2 }
    }
}

const BISECTION_LOW: f64 = 1e-40;
const BISECTION_HIGH: f64 = 1e40;
const BISECTION_RATIO: f64 = 1.0 + 1e-10;
const MAX_BISECTIONS: usize = 500;

impl OptimalityCriteria {
    fn resize(
        &self,
        problem: &dyn NlpProblem,
        x: &[f64],
        gradient: &[f64],
        constraint_gradient: &[f64],
        multiplier: f64,
    ) -> Vec<f64> {
        let lower = problem.lower_bounds();
        let upper = problem.upper_bounds();
        x.iter()
            .enumerate()
            .map(|(i, xi)| {
                let step = self.move_limit * (upper[i] - lower[i]);
                let ratio = (-gradient[i]).max(0.0)
                    / (multiplier * constraint_gradient[i].max(f64::MIN_POSITIVE));
                (xi * ratio.sqrt())
                    .clamp(xi - step, xi + step)
                    .clamp(lower[i], upper[i])
            })
            .collect()
    }
}

impl NlpSolver for OptimalityCriteria {
    fn name(&self) -> &str {
        "optimality criteria"
    }

    fn solve(
        &self,
        problem: &dyn NlpProblem,
        x0: &[f64],
        options: &SolverOptions,
    ) -> Result<NlpResult, TrussError> {
        check_start(problem, x0)?;

        let mut tracker = IterateTracker::new(options.feasibility_tolerance);
        let mut x = x0.to_vec();
        let (mut objective, mut gradient) = problem.objective_and_gradient(&x)?;
        tracker.offer(&x, objective, problem.constraint(&x));

        let bar = options.progress_bar(options.max_iterations);
        let mut iterations = 0;
        let mut converged = false;
        let mut interrupted = false;

        for iteration in 1..=options.max_iterations {
            if options.interrupted() {
                interrupted = true;
                break;
            }

            let constraint_gradient = problem.constraint_gradient(&x);
            let (mut low, mut high) = (BISECTION_LOW, BISECTION_HIGH);
            let mut bisections = 0;
            while high / low > BISECTION_RATIO && bisections < MAX_BISECTIONS {
                let mid = (low * high).sqrt();
                let trial = self.resize(problem, &x, &gradient, &constraint_gradient, mid);
                if problem.constraint(&trial) > 0.0 {
                    low = mid;
                } else {
                    high = mid;
                }
                bisections += 1;
            }
            let next = self.resize(problem, &x, &gradient, &constraint_gradient, high);

            let change = relative_change(&x, &next);
            x = next;
            (objective, gradient) = problem.objective_and_gradient(&x)?;
            let constraint = problem.constraint(&x);
            tracker.offer(&x, objective, constraint);
            iterations = iteration;

            debug!(
                "OC iteration {iteration}: objective {objective:.6e}, constraint {constraint:.3e}, change {change:.3e}"
            );
            bar.inc(1);
            bar.set_message(format!("{objective:.4e}"));

            if change < options.tolerance {
                converged = true;
                break;
            }
        }
        bar.finish_and_clear();

        tracker.finish(converged, iterations, interrupted)
    }
}

/// Augmented Lagrangian with an inner L-BFGS solve
///
/// Bounds are removed by the substitution `x = lb + (ub - lb) σ(z)`. Each
/// outer iteration minimizes `f(x) / |f(x0)| + μ/2 max(0, λ/μ + g(x))²` over
/// `z`, then updates `λ ← max(0, λ + μ g)` and grows μ.
#[derive(Debug, Clone)]
pub struct AugmentedLagrangian {
    pub max_outer_iterations: usize,
    pub initial_penalty: f64,
    pub penalty_growth: f64,
    pub max_penalty: f64,
    /// Correction pairs kept by L-BFGS
    pub memory: usize,
}

impl Default for AugmentedLagrangian {
    fn default() -> Self {
        AugmentedLagrangian {
            max_outer_iterations: 20,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e8,
            memory: 10,
        }
    }
}

const SIGMOID_EDGE: f64 = 1e-9;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Maps between box-bounded `x` and unbounded `z`
struct SigmoidBox<'a> {
    lower: &'a [f64],
    upper: &'a [f64],
}

impl<'a> SigmoidBox<'a> {
    fn to_unbounded(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, xi)| {
                let t = ((xi - self.lower[i]) / (self.upper[i] - self.lower[i]))
                    .clamp(SIGMOID_EDGE, 1.0 - SIGMOID_EDGE);
                (t / (1.0 - t)).ln()
            })
            .collect()
    }

    fn to_bounded(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .enumerate()
            .map(|(i, zi)| self.lower[i] + (self.upper[i] - self.lower[i]) * sigmoid(*zi))
            .collect()
    }

    /// `dx_i / dz_i`
    fn slope(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .enumerate()
            .map(|(i, zi)| {
                let s = sigmoid(*zi);
                (self.upper[i] - self.lower[i]) * s * (1.0 - s)
            })
            .collect()
    }
}

/// One inner subproblem in `z`. Evaluations are cached by point since argmin
/// asks for cost and gradient separately.
struct PenaltySubproblem<'a> {
    problem: &'a dyn NlpProblem,
    mapping: &'a SigmoidBox<'a>,
    scale: f64,
    multiplier: f64,
    penalty: f64,
    interrupt: Option<&'a AtomicBool>,
    tracker: &'a RefCell<IterateTracker>,
    failure: &'a RefCell<Option<TrussError>>,
    last_eval: RefCell<Option<(Vec<f64>, f64, Vec<f64>)>>,
}

impl<'a> PenaltySubproblem<'a> {
    fn ensure_evaluated(&self, z: &[f64]) -> Result<(), Error> {
        if let Some((cached, _, _)) = self.last_eval.borrow().as_ref() {
            if cached == z {
                return Ok(());
            }
        }
        if self.interrupt.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
            return Err(Error::msg("optimization interrupted"));
        }

        let x = self.mapping.to_bounded(z);
        let (objective, gradient) = match self.problem.objective_and_gradient(&x) {
            Ok(value) => value,
            Err(err) => {
                let message = err.to_string();
                *self.failure.borrow_mut() = Some(err);
                return Err(Error::msg(message));
            }
        };
        let constraint = self.problem.constraint(&x);
        self.tracker.borrow_mut().offer(&x, objective, constraint);

        let active = (self.multiplier / self.penalty + constraint).max(0.0);
        let merit = objective / self.scale + 0.5 * self.penalty * active * active;

        let constraint_gradient = self.problem.constraint_gradient(&x);
        let slope = self.mapping.slope(z);
        let merit_gradient = (0..z.len())
            .map(|i| {
                (gradient[i] / self.scale + self.penalty * active * constraint_gradient[i])
                    * slope[i]
            })
            .collect();

        *self.last_eval.borrow_mut() = Some((z.to_vec(), merit, merit_gradient));
        Ok(())
    }

    fn cached(&self) -> Result<(f64, Vec<f64>), Error> {
        self.last_eval
            .borrow()
            .as_ref()
            .map(|(_, merit, gradient)| (*merit, gradient.clone()))
            .ok_or_else(|| Error::msg("no cached evaluation"))
    }
}

impl<'a> CostFunction for PenaltySubproblem<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> Result<Self::Output, Error> {
        self.ensure_evaluated(z)?;
        Ok(self.cached()?.0)
    }
}

impl<'a> Gradient for PenaltySubproblem<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, Error> {
        self.ensure_evaluated(z)?;
        Ok(self.cached()?.1)
    }
}

/// Logs inner L-BFGS iterations and shows the best merit on the outer bar
struct LbfgsObserver {
    bar: ProgressBar,
    outer: usize,
}

impl<I> Observe<I> for LbfgsObserver
where
    I: State<Float = f64>,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        debug!(
            "AL outer {} inner {}: merit {:.6e}",
            self.outer,
            state.get_iter(),
            state.get_cost()
        );
        self.bar.set_message(format!("{:.4e}", state.get_best_cost()));
        Ok(())
    }
}

impl NlpSolver for AugmentedLagrangian {
    fn name(&self) -> &str {
        "augmented lagrangian"
    }

    fn solve(
        &self,
        problem: &dyn NlpProblem,
        x0: &[f64],
        options: &SolverOptions,
    ) -> Result<NlpResult, TrussError> {
        let bar = options.progress_bar(self.max_outer_iterations);
        let result = self.minimize(problem, x0, options, &bar);
        bar.finish_and_clear();
        result
    }
}

impl AugmentedLagrangian {
    /// Outer multiplier loop. `bar` advances once per outer iteration.
    fn minimize(
        &self,
        problem: &dyn NlpProblem,
        x0: &[f64],
        options: &SolverOptions,
        bar: &ProgressBar,
    ) -> Result<NlpResult, TrussError> {
        check_start(problem, x0)?;

        let tracker = RefCell::new(IterateTracker::new(options.feasibility_tolerance));
        let failure: RefCell<Option<TrussError>> = RefCell::new(None);

        let (objective0, _) = problem.objective_and_gradient(x0)?;
        tracker
            .borrow_mut()
            .offer(x0, objective0, problem.constraint(x0));
        let scale = objective0.abs().max(f64::MIN_POSITIVE);

        let mapping = SigmoidBox {
            lower: problem.lower_bounds(),
            upper: problem.upper_bounds(),
        };
        let mut z = mapping.to_unbounded(x0);
        let mut x = x0.to_vec();

        let mut multiplier = 0.0;
        let mut penalty = self.initial_penalty;
        let mut iterations = 0;
        let mut converged = false;
        let mut interrupted = false;

        for outer in 1..=self.max_outer_iterations {
            if options.interrupted() {
                interrupted = true;
                break;
            }

            let subproblem = PenaltySubproblem {
                problem,
                mapping: &mapping,
                scale,
                multiplier,
                penalty,
                interrupt: options.interrupt.as_deref(),
                tracker: &tracker,
                failure: &failure,
                last_eval: RefCell::new(None),
            };
            let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.memory)
                .with_tolerance_grad(options.tolerance * 1e-2)?;
            let observer = LbfgsObserver {
                bar: bar.clone(),
                outer,
            };

            let run = Executor::new(subproblem, solver)
                .configure(|state| state.param(z.clone()).max_iters(options.max_iterations as u64))
                .add_observer(observer, ObserverMode::Always)
                .run();

            match run {
                Ok(result) => {
                    iterations += result.state().get_iter() as usize;
                    if let Some(best) = result.state().get_best_param() {
                        z = best.clone();
                    }
                }
                Err(err) => {
                    if let Some(cause) = failure.borrow_mut().take() {
                        return Err(cause);
                    }
                    if options.interrupted() {
                        interrupted = true;
                    } else {
                        warn!("inner L-BFGS stopped early: {err}");
                    }
                    break;
                }
            }

            let next = mapping.to_bounded(&z);
            let constraint = problem.constraint(&next);
            let change = relative_change(&x, &next);
            x = next;
            bar.inc(1);
            debug!(
                "AL outer {outer}: constraint {constraint:.3e}, multiplier {multiplier:.3e}, penalty {penalty:.1e}, change {change:.3e}"
            );

            if constraint <= options.feasibility_tolerance && change < options.tolerance {
                converged = true;
                break;
            }

            multiplier = (multiplier + penalty * constraint).max(0.0);
            penalty = (penalty * self.penalty_growth).min(self.max_penalty);
        }

        tracker
            .into_inner()
            .finish(converged, iterations, interrupted)
    }
}

/// Named choice of `NlpSolver`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    OptimalityCriteria,
    AugmentedLagrangian,
}

impl Method {
    pub fn solver(&self) -> Box<dyn NlpSolver> {
        match self {
            Method::OptimalityCriteria => Box::new(OptimalityCriteria::default()),
            Method::AugmentedLagrangian => Box::new(AugmentedLagrangian::default()),
        }
    }
}

impl FromStr for Method {
    type Err = TrussError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oc" | "optimality_criteria" => Ok(Method::OptimalityCriteria),
            "al" | "augmented_lagrangian" => Ok(Method::AugmentedLagrangian),
            other => Err(TrussError::Input(format!(
                "Unknown optimization method '{other}', expected 'oc' or 'augmented_lagrangian'"
            ))),
        }
    }
}

/// Minimize compliance subject to `volume(x) / volume(x_max) - V0 <= 0`
pub struct ComplianceProblem<'a, S> {
    evaluator: Evaluator<'a, S>,
    bounds: &'a DesignBounds,
    volume_fraction: f64,
    max_volume: f64,
}

impl<'a, S: DisplacementSource> ComplianceProblem<'a, S> {
    pub fn new(
        evaluator: Evaluator<'a, S>,
        bounds: &'a DesignBounds,
        volume_fraction: f64,
    ) -> Result<ComplianceProblem<'a, S>, TrussError> {
        evaluator.geometry().check_bar_vector("Bounds", &bounds.lower)?;
        if volume_fraction <= 0.0 || volume_fraction > 1.0 || volume_fraction.is_nan() {
            return Err(TrussError::Input(format!(
                "Volume fraction must be in (0, 1], got {volume_fraction}"
            )));
        }
        let (max_volume, _) = evaluator.volume(&bounds.upper);
        Ok(ComplianceProblem {
            evaluator,
            bounds,
            volume_fraction,
            max_volume,
        })
    }

    pub fn evaluator(&self) -> &Evaluator<'a, S> {
        &self.evaluator
    }

    /// Volume relative to the all-`x_max` design
    pub fn volume_ratio(&self, x: &[f64]) -> f64 {
        self.evaluator.volume(x).0 / self.max_volume
    }
}

impl<'a, S: DisplacementSource> NlpProblem for ComplianceProblem<'a, S> {
    fn dimension(&self) -> usize {
        self.evaluator.geometry().bar_count()
    }

    fn objective_and_gradient(&self, x: &[f64]) -> Result<(f64, Vec<f64>), TrussError> {
        let evaluation = self.evaluator.evaluate(x)?;
        Ok((evaluation.compliance, evaluation.gradient))
    }

    fn constraint(&self, x: &[f64]) -> f64 {
        self.volume_ratio(x) - self.volume_fraction
    }

    fn constraint_gradient(&self, x: &[f64]) -> Vec<f64> {
        let (_, lengths) = self.evaluator.volume(x);
        lengths.iter().map(|l| l / self.max_volume).collect()
    }

    fn lower_bounds(&self) -> &[f64] {
        &self.bounds.lower
    }

    fn upper_bounds(&self) -> &[f64] {
        &self.bounds.upper
    }
}

#[derive(Debug, Clone)]
pub struct OptimizationSettings {
    /// Target volume as a share of the all-`x_max` volume
    pub volume_fraction: f64,
    pub bounds: DesignBounds,
    /// Starting design
    pub x0: Vec<f64>,
    pub method: Method,
    pub options: SolverOptions,
}

#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub design: Vec<f64>,
    /// Objective reported by the displacement source that was optimized
    pub objective: f64,
    pub volume_fraction: f64,
    pub feasible: bool,
    pub converged: bool,
    pub interrupted: bool,
    pub iterations: usize,
    /// Exact re-evaluation of `design`
    pub evaluation: Evaluation,
    /// Support reactions of the exact re-evaluation, zero at free DOFs
    pub reactions: DVector<f64>,
}

/// Minimizes compliance under the volume constraint using `source` for
/// displacements
///
/// # Arguments
/// * `geometry` - The truss geometry
/// * `load_case` - Material, loads and supports
/// * `source` - Exact solver or trained surrogate
/// * `settings` - Constraint, bounds, starting point and solver choice
///
/// # Returns
/// The optimized design with an exact evaluation of it
pub fn optimize<S: DisplacementSource>(
    geometry: &Geometry,
    load_case: &LoadCase,
    source: S,
    settings: &OptimizationSettings,
) -> Result<OptimizationOutcome, TrussError> {
    let evaluator = Evaluator::new(geometry, load_case, source);
    let source_name = evaluator.source().name().to_owned();
    let problem = ComplianceProblem::new(evaluator, &settings.bounds, settings.volume_fraction)?;

    let x0 = &settings.x0;
    geometry.check_bar_vector("Starting design", x0)?;
    if !settings.bounds.contains(x0) {
        return Err(TrussError::InfeasibleStart(
            "Starting design lies outside the area bounds".to_owned(),
        ));
    }
    let start_violation = problem.constraint(x0);
    if start_violation > settings.options.feasibility_tolerance {
        return Err(TrussError::InfeasibleStart(format!(
            "Starting design uses volume fraction {:.4}, above the limit {:.4}",
            problem.volume_ratio(x0),
            settings.volume_fraction
        )));
    }

    let solver = settings.method.solver();
    info!(
        "optimizing {} bars with {} on {} displacements...",
        geometry.bar_count(),
        solver.name(),
        source_name
    );
    let result = solver.solve(&problem, x0, &settings.options)?;

    if result.interrupted {
        warn!("optimization interrupted, returning best feasible design");
    }
    if !result.converged && !result.interrupted {
        warn!(
            "{} did not converge in {} iterations",
            solver.name(),
            result.iterations
        );
    }

    let volume_fraction = problem.volume_ratio(&result.x);
    let evaluation = Evaluator::new(geometry, load_case, ExactSolver).evaluate(&result.x)?;
    let stiffness = assemble_stiffness(geometry, load_case.youngs_modulus(), &result.x)?;
    let reactions = compute_reactions(&stiffness, &evaluation.displacements, load_case);
    info!(
        "finished after {} iterations: compliance {:.6e}, volume fraction {:.4}",
        result.iterations, evaluation.compliance, volume_fraction
    );

    Ok(OptimizationOutcome {
        design: result.x,
        objective: result.objective,
        volume_fraction,
        feasible: result.feasible,
        converged: result.converged,
        interrupted: result.interrupted,
        iterations: result.iterations,
        evaluation,
        reactions,
    })
}
