//! Learned stand-in for the exact displacement solve.
//!
//! Training designs are drawn by Latin hypercube sampling over the area
//! bounds, labelled with the exact free-DOF displacements, and fitted by a
//! `Regressor`. The fitted model then answers `DisplacementSource` queries.

use indicatif::ProgressBar;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::{
    datatypes::{DesignBounds, Geometry, LoadCase},
    error::TrussError,
    solver::{DisplacementSource, ExactSolver},
};

/// Sampling and fitting settings
#[derive(Debug, Clone)]
pub struct SurrogateConfig {
    /// Total samples, split between training and held-out test sets
    pub samples: usize,
    /// Share of `samples` held out for testing
    pub test_ratio: f64,
    /// Share of the training set carved out for validation while fitting
    pub validation_fraction: f64,
    pub epochs: usize,
    pub seed: u64,
    pub show_progress: bool,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        SurrogateConfig {
            samples: 100,
            test_ratio: 0.2,
            validation_fraction: 0.15,
            epochs: 100,
            seed: 0,
            show_progress: false,
        }
    }
}

/// Paired designs and exact free-DOF displacements. Entry `i` of both
/// vectors comes from sample `i`.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub inputs: Vec<DVector<f64>>,
    pub outputs: Vec<DVector<f64>>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Errors measured while fitting, in displacement units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    pub train_mse: f64,
    pub validation_mse: Option<f64>,
}

/// Diagnostics of a trained surrogate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurrogateReport {
    pub train_samples: usize,
    pub test_samples: usize,
    pub train_mse: f64,
    pub validation_mse: Option<f64>,
    pub test_mse: Option<f64>,
    pub test_mae: Option<f64>,
}

/// A fitted map from design vector to free-DOF displacements
pub trait SurrogateModel {
    fn predict(&self, design: &[f64]) -> DVector<f64>;

    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;
}

/// Fits a `SurrogateModel` to training pairs
pub trait Regressor {
    type Model: SurrogateModel;

    /// # Arguments
    /// * `inputs` - Design vectors
    /// * `outputs` - Matching displacement vectors
    /// * `validation_fraction` - Trailing share of the pairs held out for monitoring
    /// * `epochs` - Passes over the data, for iterative regressors
    fn train(
        &self,
        inputs: &[DVector<f64>],
        outputs: &[DVector<f64>],
        validation_fraction: f64,
        epochs: usize,
    ) -> Result<(Self::Model, FitSummary), TrussError>;
}

/// The trained model plus its diagnostics
#[derive(Debug, Clone)]
pub struct TrainedSurrogate<M> {
    pub model: M,
    pub report: SurrogateReport,
}

/// Serves displacements from a trained model instead of solving
#[derive(Debug, Clone)]
pub struct SurrogateSolver<M>(pub M);

impl<M: SurrogateModel> DisplacementSource for SurrogateSolver<M> {
    fn free_displacements(
        &self,
        geometry: &Geometry,
        load_case: &LoadCase,
        areas: &[f64],
    ) -> Result<DVector<f64>, TrussError> {
        if areas.len() != self.0.input_dim() || geometry.bar_count() != self.0.input_dim() {
            return Err(TrussError::Surrogate(format!(
                "Surrogate expects {} design variables, got {} for a truss of {} bars",
                self.0.input_dim(),
                areas.len(),
                geometry.bar_count()
            )));
        }
        if self.0.output_dim() != load_case.free_count() {
            return Err(TrussError::Surrogate(format!(
                "Surrogate predicts {} displacements but the load case has {} free DOFs",
                self.0.output_dim(),
                load_case.free_count()
            )));
        }
        Ok(self.0.predict(areas))
    }

    fn name(&self) -> &str {
        "surrogate"
    }
}

/// Stratified sampling of the unit hypercube
///
/// Each dimension is split into `samples` equal strata holding one sample
/// each; strata are paired across dimensions by independent shuffles.
pub fn latin_hypercube<R: Rng + ?Sized>(samples: usize, dims: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut points = vec![vec![0.0; dims]; samples];
    let mut strata: Vec<usize> = (0..samples).collect();

    for d in 0..dims {
        strata.shuffle(rng);
        for (point, stratum) in points.iter_mut().zip(&strata) {
            point[d] = (*stratum as f64 + rng.gen::<f64>()) / samples as f64;
        }
    }

    points
}

/// Samples `count` designs within `bounds` and labels each with the exact
/// free-DOF displacements
pub fn generate_training_set<R: Rng + ?Sized>(
    geometry: &Geometry,
    load_case: &LoadCase,
    bounds: &DesignBounds,
    count: usize,
    rng: &mut R,
    show_progress: bool,
) -> Result<TrainingSet, TrussError> {
    if count == 0 {
        return Err(TrussError::Surrogate("Sample set is empty".to_owned()));
    }
    if load_case.free_count() == 0 {
        return Err(TrussError::Surrogate(
            "Load case has zero degrees of freedom".to_owned(),
        ));
    }
    if bounds.len() != geometry.bar_count() {
        return Err(TrussError::Surrogate(format!(
            "Bounds cover {} bars but the truss has {}",
            bounds.len(),
            geometry.bar_count()
        )));
    }

    let unit_samples = latin_hypercube(count, geometry.bar_count(), rng);

    let bar = if show_progress {
        ProgressBar::new(count as u64)
    } else {
        ProgressBar::hidden()
    };

    let mut set = TrainingSet {
        inputs: Vec::with_capacity(count),
        outputs: Vec::with_capacity(count),
    };
    for unit in &unit_samples {
        let design = bounds.from_unit(unit);
        let displacements = ExactSolver.free_displacements(geometry, load_case, &design)?;
        set.inputs.push(DVector::from_vec(design));
        set.outputs.push(displacements);
        bar.inc(1);
    }
    bar.finish_and_clear();

    debug!("labelled {count} sampled designs with the exact solver");
    Ok(set)
}

/// Draws training and test sets, fits `regressor` and measures held-out error
///
/// # Arguments
/// * `geometry` - The truss geometry
/// * `load_case` - Material, loads and supports
/// * `bounds` - Area range each sample coordinate is mapped onto
/// * `config` - Sampling and fitting settings
/// * `regressor` - The model family to fit
///
/// # Returns
/// The trained model together with its error report
pub fn train_surrogate<R: Regressor>(
    geometry: &Geometry,
    load_case: &LoadCase,
    bounds: &DesignBounds,
    config: &SurrogateConfig,
    regressor: &R,
) -> Result<TrainedSurrogate<R::Model>, TrussError> {
    if !(0.0..1.0).contains(&config.test_ratio) {
        return Err(TrussError::Surrogate(format!(
            "test_ratio must be in [0, 1), got {}",
            config.test_ratio
        )));
    }
    if !(0.0..1.0).contains(&config.validation_fraction) {
        return Err(TrussError::Surrogate(format!(
            "validation_fraction must be in [0, 1), got {}",
            config.validation_fraction
        )));
    }

    let train_count = ((1.0 - config.test_ratio) * config.samples as f64) as usize;
    let test_count = (config.test_ratio * config.samples as f64) as usize;
    if train_count == 0 {
        return Err(TrussError::Surrogate(format!(
            "{} samples with test_ratio {} leave no training samples",
            config.samples, config.test_ratio
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);

    info!("sampling {train_count} training designs...");
    let training = generate_training_set(
        geometry,
        load_case,
        bounds,
        train_count,
        &mut rng,
        config.show_progress,
    )?;

    let test = if test_count > 0 {
        info!("sampling {test_count} test designs...");
        Some(generate_training_set(
            geometry,
            load_case,
            bounds,
            test_count,
            &mut rng,
            config.show_progress,
        )?)
    } else {
        warn!("no held-out test samples, test error is not measured");
        None
    };

    info!("fitting surrogate...");
    let (model, fit) = regressor.train(
        &training.inputs,
        &training.outputs,
        config.validation_fraction,
        config.epochs,
    )?;

    let (test_mse, test_mae) = match &test {
        Some(set) => {
            let (mse, mae) = prediction_errors(&model, &set.inputs, &set.outputs);
            (Some(mse), Some(mae))
        }
        None => (None, None),
    };

    let report = SurrogateReport {
        train_samples: train_count,
        test_samples: test_count,
        train_mse: fit.train_mse,
        validation_mse: fit.validation_mse,
        test_mse,
        test_mae,
    };
    info!(
        "surrogate trained: train mse {:.3e}, test mse {}, test mae {}",
        report.train_mse,
        format_metric(report.test_mse),
        format_metric(report.test_mae)
    );

    Ok(TrainedSurrogate { model, report })
}

fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.3e}"))
}

/// Mean squared and mean absolute error of `model` over every output of
/// every pair
pub fn prediction_errors<M: SurrogateModel + ?Sized>(
    model: &M,
    inputs: &[DVector<f64>],
    outputs: &[DVector<f64>],
) -> (f64, f64) {
    let mut squared = 0.0;
    let mut absolute = 0.0;
    let mut count = 0usize;
    for (x, y) in inputs.iter().zip(outputs) {
        let residual = model.predict(x.as_slice()) - y;
        squared += residual.norm_squared();
        absolute += residual.iter().map(|r| r.abs()).sum::<f64>();
        count += residual.len();
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    (squared / count as f64, absolute / count as f64)
}

/// Validates pair counts and dimensions, returning `(input_dim, output_dim)`
fn check_training_data(
    inputs: &[DVector<f64>],
    outputs: &[DVector<f64>],
) -> Result<(usize, usize), TrussError> {
    if inputs.is_empty() {
        return Err(TrussError::Surrogate("Training set is empty".to_owned()));
    }
    if inputs.len() != outputs.len() {
        return Err(TrussError::Surrogate(format!(
            "{} inputs but {} outputs",
            inputs.len(),
            outputs.len()
        )));
    }
    let input_dim = inputs[0].len();
    let output_dim = outputs[0].len();
    if input_dim == 0 || output_dim == 0 {
        return Err(TrussError::Surrogate(
            "Training pairs must have at least one input and one output".to_owned(),
        ));
    }
    if inputs.iter().any(|x| x.len() != input_dim) || outputs.iter().any(|y| y.len() != output_dim)
    {
        return Err(TrussError::Surrogate(
            "Training pairs have inconsistent dimensions".to_owned(),
        ));
    }
    Ok((input_dim, output_dim))
}

/// Number of leading pairs kept for fitting; the rest validate
fn fitting_count(total: usize, validation_fraction: f64) -> Result<usize, TrussError> {
    let validation = (total as f64 * validation_fraction) as usize;
    if validation >= total {
        return Err(TrussError::Surrogate(format!(
            "validation_fraction {validation_fraction} leaves no pairs to fit out of {total}"
        )));
    }
    Ok(total - validation)
}

/// Per-component affine map `(v - offset) / scale`
#[derive(Debug, Clone)]
struct Scaling {
    offset: DVector<f64>,
    scale: DVector<f64>,
}

impl Scaling {
    /// Maps each component's observed range onto [0, 1]
    fn min_max(samples: &[DVector<f64>]) -> Scaling {
        let dim = samples[0].len();
        let mut low = DVector::from_element(dim, f64::INFINITY);
        let mut high = DVector::from_element(dim, f64::NEG_INFINITY);
        for sample in samples {
            for i in 0..dim {
                low[i] = low[i].min(sample[i]);
                high[i] = high[i].max(sample[i]);
            }
        }
        let scale = (&high - &low).map(|range| if range > 0.0 { range } else { 1.0 });
        Scaling { offset: low, scale }
    }

    /// Zero mean, unit variance per component
    fn standard(samples: &[DVector<f64>]) -> Scaling {
        let count = samples.len() as f64;
        let dim = samples[0].len();
        let mut mean = DVector::zeros(dim);
        for sample in samples {
            mean += sample;
        }
        mean /= count;

        let mut variance = DVector::zeros(dim);
        for sample in samples {
            variance += (sample - &mean).map(|d| d * d);
        }
        variance /= count;

        let scale = variance.map(|v| if v > 0.0 { v.sqrt() } else { 1.0 });
        Scaling {
            offset: mean,
            scale,
        }
    }

    fn apply(&self, value: &DVector<f64>) -> DVector<f64> {
        (value - &self.offset).component_div(&self.scale)
    }

    fn invert(&self, value: &DVector<f64>) -> DVector<f64> {
        value.component_mul(&self.scale) + &self.offset
    }
}

/// Gaussian radial basis function interpolation.
///
/// Inputs are min-max scaled and outputs standardized; the length scale is
/// `shape_factor` times the mean nearest-neighbour distance between training
/// inputs. The fit passes through every training pair up to `nugget`.
#[derive(Debug, Clone)]
pub struct RbfRegressor {
    pub shape_factor: f64,
    pub nugget: f64,
}

impl Default for RbfRegressor {
    fn default() -> Self {
        RbfRegressor {
            shape_factor: 1.5,
            nugget: 1e-10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RbfModel {
    input_scaling: Scaling,
    output_scaling: Scaling,
    centers: Vec<DVector<f64>>,
    weights: DMatrix<f64>,
    length_scale: f64,
}

impl RbfModel {
    fn kernel(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        let r = (a - b).norm() / self.length_scale;
        (-r * r).exp()
    }
}

impl SurrogateModel for RbfModel {
    fn predict(&self, design: &[f64]) -> DVector<f64> {
        let x = self.input_scaling.apply(&DVector::from_column_slice(design));
        let basis = DVector::from_iterator(
            self.centers.len(),
            self.centers.iter().map(|center| self.kernel(&x, center)),
        );
        self.output_scaling.invert(&(self.weights.tr_mul(&basis)))
    }

    fn input_dim(&self) -> usize {
        self.input_scaling.offset.len()
    }

    fn output_dim(&self) -> usize {
        self.output_scaling.offset.len()
    }
}

impl RbfRegressor {
    fn fit(&self, inputs: &[DVector<f64>], outputs: &[DVector<f64>]) -> Result<RbfModel, TrussError> {
        let input_scaling = Scaling::min_max(inputs);
        let output_scaling = Scaling::standard(outputs);
        let centers: Vec<DVector<f64>> = inputs.iter().map(|x| input_scaling.apply(x)).collect();
        let count = centers.len();

        let length_scale = self.shape_factor * mean_nearest_distance(&centers);
        let targets = DMatrix::from_fn(count, outputs[0].len(), |i, k| {
            (outputs[i][k] - output_scaling.offset[k]) / output_scaling.scale[k]
        });

        let mut model = RbfModel {
            input_scaling,
            output_scaling,
            centers,
            weights: DMatrix::zeros(0, 0),
            length_scale,
        };

        let kernel = DMatrix::from_fn(count, count, |i, j| {
            model.kernel(&model.centers[i], &model.centers[j])
        });

        // grow the nugget until the kernel factorizes
        let mut nugget = self.nugget;
        while nugget <= 1e-4 {
            let regularized = &kernel + DMatrix::identity(count, count) * nugget;
            if let Some(cholesky) = regularized.cholesky() {
                model.weights = cholesky.solve(&targets);
                if nugget > self.nugget {
                    warn!("RBF kernel needed nugget {nugget:e} to factorize");
                }
                return Ok(model);
            }
            nugget *= 100.0;
        }

        Err(TrussError::Surrogate(
            "RBF kernel matrix is not positive definite; training inputs may repeat".to_owned(),
        ))
    }
}

fn mean_nearest_distance(points: &[DVector<f64>]) -> f64 {
    if points.len() < 2 {
        return 1.0;
    }
    let total: f64 = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| (p - q).norm())
                .fold(f64::INFINITY, f64::min)
        })
        .sum();
    let mean = total / points.len() as f64;
    if mean > 0.0 {
        mean
    } else {
        1.0
    }
}

impl Regressor for RbfRegressor {
    type Model = RbfModel;

    /// Scores a fit on the leading pairs against the validation tail, then
    /// refits on every pair so the returned model interpolates all of them
    fn train(
        &self,
        inputs: &[DVector<f64>],
        outputs: &[DVector<f64>],
        validation_fraction: f64,
        _epochs: usize,
    ) -> Result<(RbfModel, FitSummary), TrussError> {
        check_training_data(inputs, outputs)?;
        let fit_count = fitting_count(inputs.len(), validation_fraction)?;

        let validation_mse = if fit_count < inputs.len() {
            let partial = self.fit(&inputs[..fit_count], &outputs[..fit_count])?;
            Some(prediction_errors(&partial, &inputs[fit_count..], &outputs[fit_count..]).0)
        } else {
            None
        };

        let model = self.fit(inputs, outputs)?;
        let train_mse = prediction_errors(&model, inputs, outputs).0;

        Ok((
            model,
            FitSummary {
                train_mse,
                validation_mse,
            },
        ))
    }
}

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

/// One hidden ReLU layer and a linear output layer trained with Adam on
/// mean squared error. The trailing validation pairs drive early stopping and
/// the weights with the best validation loss are kept.
#[derive(Debug, Clone)]
pub struct MlpRegressor {
    pub hidden: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    pub seed: u64,
}

impl Default for MlpRegressor {
    fn default() -> Self {
        MlpRegressor {
            hidden: 8,
            learning_rate: 1e-3,
            batch_size: 32,
            patience: 20,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Layers {
    w1: DMatrix<f64>,
    b1: DMatrix<f64>,
    w2: DMatrix<f64>,
    b2: DMatrix<f64>,
}

struct Gradients {
    w1: DMatrix<f64>,
    b1: DMatrix<f64>,
    w2: DMatrix<f64>,
    b2: DMatrix<f64>,
}

impl Layers {
    fn glorot<R: Rng + ?Sized>(inputs: usize, hidden: usize, outputs: usize, rng: &mut R) -> Layers {
        let limit1 = (6.0 / (inputs + hidden) as f64).sqrt();
        let limit2 = (6.0 / (hidden + outputs) as f64).sqrt();
        Layers {
            w1: DMatrix::from_fn(hidden, inputs, |_, _| rng.gen_range(-limit1..limit1)),
            b1: DMatrix::zeros(hidden, 1),
            w2: DMatrix::from_fn(outputs, hidden, |_, _| rng.gen_range(-limit2..limit2)),
            b2: DMatrix::zeros(outputs, 1),
        }
    }

    /// Returns the hidden pre-activations and the outputs for a batch stored
    /// column-wise
    fn forward(&self, x: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let mut hidden = &self.w1 * x;
        add_bias(&mut hidden, &self.b1);
        let activated = hidden.map(|z| z.max(0.0));
        let mut output = &self.w2 * activated;
        add_bias(&mut output, &self.b2);
        (hidden, output)
    }

    /// Mean squared error of a batch and its gradient
    fn backward(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> (f64, Gradients) {
        let (hidden, output) = self.forward(x);
        let residual = output - y;
        let count = residual.len() as f64;
        let loss = residual.norm_squared() / count;

        let d_output = residual * (2.0 / count);
        let activated = hidden.map(|z| z.max(0.0));
        let d_hidden = (self.w2.tr_mul(&d_output)).zip_map(&hidden, |g, z| if z > 0.0 { g } else { 0.0 });

        let gradients = Gradients {
            w2: &d_output * activated.transpose(),
            b2: column(d_output.column_sum()),
            w1: &d_hidden * x.transpose(),
            b1: column(d_hidden.column_sum()),
        };
        (loss, gradients)
    }
}

fn add_bias(values: &mut DMatrix<f64>, bias: &DMatrix<f64>) {
    for j in 0..values.ncols() {
        for i in 0..values.nrows() {
            values[(i, j)] += bias[(i, 0)];
        }
    }
}

fn column(vector: DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_column_slice(vector.len(), 1, vector.as_slice())
}

/// Adam moment estimates for one parameter tensor
struct Moments {
    first: DMatrix<f64>,
    second: DMatrix<f64>,
}

impl Moments {
    fn like(param: &DMatrix<f64>) -> Moments {
        Moments {
            first: DMatrix::zeros(param.nrows(), param.ncols()),
            second: DMatrix::zeros(param.nrows(), param.ncols()),
        }
    }

    fn step(&mut self, param: &mut DMatrix<f64>, grad: &DMatrix<f64>, learning_rate: f64, t: i32) {
        let first_correction = 1.0 - ADAM_BETA1.powi(t);
        let second_correction = 1.0 - ADAM_BETA2.powi(t);
        for i in 0..param.len() {
            self.first[i] = ADAM_BETA1 * self.first[i] + (1.0 - ADAM_BETA1) * grad[i];
            self.second[i] = ADAM_BETA2 * self.second[i] + (1.0 - ADAM_BETA2) * grad[i] * grad[i];
            let m = self.first[i] / first_correction;
            let v = self.second[i] / second_correction;
            param[i] -= learning_rate * m / (v.sqrt() + ADAM_EPSILON);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MlpModel {
    input_scaling: Scaling,
    output_scaling: Scaling,
    layers: Layers,
}

impl SurrogateModel for MlpModel {
    fn predict(&self, design: &[f64]) -> DVector<f64> {
        let x = self.input_scaling.apply(&DVector::from_column_slice(design));
        let batch = DMatrix::from_column_slice(x.len(), 1, x.as_slice());
        let (_, output) = self.layers.forward(&batch);
        self.output_scaling
            .invert(&DVector::from_iterator(output.len(), output.iter().copied()))
    }

    fn input_dim(&self) -> usize {
        self.input_scaling.offset.len()
    }

    fn output_dim(&self) -> usize {
        self.output_scaling.offset.len()
    }
}

/// Stacks the selected scaled samples column-wise
fn batch_matrix(samples: &[DVector<f64>], indices: &[usize]) -> DMatrix<f64> {
    let dim = samples[0].len();
    DMatrix::from_fn(dim, indices.len(), |i, j| samples[indices[j]][i])
}

impl Regressor for MlpRegressor {
    type Model = MlpModel;

    fn train(
        &self,
        inputs: &[DVector<f64>],
        outputs: &[DVector<f64>],
        validation_fraction: f64,
        epochs: usize,
    ) -> Result<(MlpModel, FitSummary), TrussError> {
        let (input_dim, output_dim) = check_training_data(inputs, outputs)?;
        if self.hidden == 0 || self.batch_size == 0 {
            return Err(TrussError::Surrogate(
                "MLP needs at least one hidden unit and a non-zero batch size".to_owned(),
            ));
        }
        let fit_count = fitting_count(inputs.len(), validation_fraction)?;

        let input_scaling = Scaling::min_max(&inputs[..fit_count]);
        let output_scaling = Scaling::standard(&outputs[..fit_count]);
        let x: Vec<DVector<f64>> = inputs.iter().map(|v| input_scaling.apply(v)).collect();
        let y: Vec<DVector<f64>> = outputs.iter().map(|v| output_scaling.apply(v)).collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut layers = Layers::glorot(input_dim, self.hidden, output_dim, &mut rng);
        let mut moments = [
            Moments::like(&layers.w1),
            Moments::like(&layers.b1),
            Moments::like(&layers.w2),
            Moments::like(&layers.b2),
        ];

        let mut order: Vec<usize> = (0..fit_count).collect();
        let monitor: Vec<usize> = if fit_count < inputs.len() {
            (fit_count..inputs.len()).collect()
        } else {
            (0..fit_count).collect()
        };
        let monitor_x = batch_matrix(&x, &monitor);
        let monitor_y = batch_matrix(&y, &monitor);

        let mut best = (f64::INFINITY, layers.clone());
        let mut stale_epochs = 0;
        let mut step = 0;

        for epoch in 0..epochs.max(1) {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.batch_size) {
                step += 1;
                let (loss, grads) =
                    layers.backward(&batch_matrix(&x, batch), &batch_matrix(&y, batch));
                epoch_loss += loss * batch.len() as f64;

                moments[0].step(&mut layers.w1, &grads.w1, self.learning_rate, step);
                moments[1].step(&mut layers.b1, &grads.b1, self.learning_rate, step);
                moments[2].step(&mut layers.w2, &grads.w2, self.learning_rate, step);
                moments[3].step(&mut layers.b2, &grads.b2, self.learning_rate, step);
            }

            let (_, monitor_output) = layers.forward(&monitor_x);
            let monitor_loss = (monitor_output - &monitor_y).norm_squared() / monitor_y.len() as f64;
            debug!(
                "epoch {}: loss {:.4e}, monitored loss {:.4e}",
                epoch + 1,
                epoch_loss / fit_count as f64,
                monitor_loss
            );

            if monitor_loss < best.0 {
                best = (monitor_loss, layers.clone());
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs >= self.patience {
                    debug!("early stop after epoch {}", epoch + 1);
                    break;
                }
            }
        }

        let model = MlpModel {
            input_scaling,
            output_scaling,
            layers: best.1,
        };
        let train_mse = prediction_errors(&model, &inputs[..fit_count], &outputs[..fit_count]).0;
        let validation_mse = if fit_count < inputs.len() {
            Some(prediction_errors(&model, &inputs[fit_count..], &outputs[fit_count..]).0)
        } else {
            None
        };

        Ok((
            model,
            FitSummary {
                train_mse,
                validation_mse,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_hypercube_fills_every_stratum_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = 12;
        let points = latin_hypercube(samples, 4, &mut rng);

        assert_eq!(points.len(), samples);
        for d in 0..4 {
            let mut strata: Vec<usize> = points
                .iter()
                .map(|p| {
                    assert!((0.0..1.0).contains(&p[d]));
                    (p[d] * samples as f64).floor() as usize
                })
                .collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..samples).collect::<Vec<_>>());
        }
    }

    #[test]
    fn latin_hypercube_is_seed_deterministic() {
        let a = latin_hypercube(5, 3, &mut StdRng::seed_from_u64(1));
        let b = latin_hypercube(5, 3, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    fn smooth_pairs(count: usize, seed: u64) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let inputs: Vec<DVector<f64>> = latin_hypercube(count, 2, &mut rng)
            .into_iter()
            .map(DVector::from_vec)
            .collect();
        let outputs = inputs
            .iter()
            .map(|x| DVector::from_vec(vec![x[0] + 2.0 * x[1], 3.0 - x[0]]))
            .collect();
        (inputs, outputs)
    }

    #[test]
    fn rbf_interpolates_training_pairs() {
        let (inputs, outputs) = smooth_pairs(30, 3);
        let (model, fit) = RbfRegressor::default()
            .train(&inputs, &outputs, 0.2, 0)
            .unwrap();

        assert!(fit.train_mse < 1e-8);
        assert!(fit.validation_mse.unwrap() > fit.train_mse);
        let prediction = model.predict(inputs[4].as_slice());
        assert!((&prediction - &outputs[4]).amax() < 1e-3);
        assert_eq!(model.input_dim(), 2);
        assert_eq!(model.output_dim(), 2);
    }

    #[test]
    fn mlp_learns_a_linear_map() {
        let (inputs, outputs) = smooth_pairs(200, 5);
        let (test_inputs, test_outputs) = smooth_pairs(40, 6);
        let regressor = MlpRegressor {
            learning_rate: 1e-2,
            patience: 50,
            ..MlpRegressor::default()
        };

        let (model, fit) = regressor.train(&inputs, &outputs, 0.15, 300).unwrap();
        let (test_mse, _) = prediction_errors(&model, &test_inputs, &test_outputs);

        // output variance is roughly 0.4, so this is a real fit
        assert!(fit.validation_mse.is_some());
        assert!(test_mse < 0.05, "test mse {test_mse}");
    }

    #[test]
    fn rejects_bad_training_data() {
        let regressor = RbfRegressor::default();
        assert!(regressor.train(&[], &[], 0.0, 0).is_err());

        let inputs = vec![DVector::from_vec(vec![0.0]), DVector::from_vec(vec![1.0])];
        let outputs = vec![DVector::from_vec(vec![0.0])];
        assert!(regressor.train(&inputs, &outputs, 0.0, 0).is_err());
    }
}
