use json::JsonValue;
use log::info;

use crate::{
    datatypes::{DesignBounds, Geometry, LoadCase, DOF},
    error::TrussError,
    mesher::{mesh_grid, remove_bar, remove_node, BarRemoval},
    optimizer::{Method, OptimizationSettings, SolverOptions},
    surrogate::SurrogateConfig,
};

/// Rectangular grid to mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshConfig {
    pub corner1: (f64, f64),
    pub corner2: (f64, f64),
    pub nx: usize,
    pub ny: usize,
}

/// Nodes strictly inside `(x_min, x_max) x (y_min, y_max)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundaryRegion {
    fn contains(&self, x: f64, y: f64) -> bool {
        x > self.x_min && x < self.x_max && y > self.y_min && y < self.y_max
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeSelector {
    Region(BoundaryRegion),
    Nodes(Vec<usize>),
}

/// Supports and loads applied to every selected node
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRule {
    pub name: String,
    pub selector: NodeSelector,
    pub fixed: [bool; DOF],
    pub force: [f64; DOF],
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    pub volume_fraction: f64,
    pub area_min: f64,
    pub area_max: f64,
    pub initial_area: f64,
    pub method: Method,
    pub max_iterations: usize,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    Rbf,
    Mlp,
}

#[derive(Debug, Clone)]
pub struct SurrogateSection {
    pub model: ModelKind,
    pub config: SurrogateConfig,
}

/// Everything read from an input file
#[derive(Debug, Clone)]
pub struct ProblemConfig {
    pub mesh: MeshConfig,
    pub remove_nodes: Vec<usize>,
    pub remove_bars: Vec<(usize, usize)>,
    pub youngs_modulus: f64,
    pub boundary_rules: Vec<BoundaryRule>,
    pub optimization: OptimizationConfig,
    pub surrogate: Option<SurrogateSection>,
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - Path to the input json
///
/// # Returns
/// The parsed json, once the required sections are known to be present
pub fn load_input_file(input_file: &str) -> Result<JsonValue, TrussError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(s) => s,
        Err(err) => {
            return Err(TrussError::Input(format!(
                "Unable to read input file {input_file}: {err}"
            )))
        }
    };

    parse_input_string(&file_string)
}

/// Same as `load_input_file` for json already in memory
pub fn parse_input_string(input: &str) -> Result<JsonValue, TrussError> {
    let input_json = match json::parse(input) {
        Ok(j) => j,
        Err(err) => {
            return Err(TrussError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    for section in ["mesh", "material", "boundary_conditions", "optimization"] {
        if !input_json.has_key(section) {
            return Err(TrussError::Input(format!(
                "Input json missing {section} section"
            )));
        }
    }

    Ok(input_json)
}

fn required_f64(value: &JsonValue, section: &str, key: &str) -> Result<f64, TrussError> {
    value[key].as_f64().ok_or_else(|| {
        TrussError::Input(format!("Input json missing number {key} in {section}"))
    })
}

fn optional_f64(value: &JsonValue, section: &str, key: &str, default: f64) -> Result<f64, TrussError> {
    if value[key].is_null() {
        return Ok(default);
    }
    required_f64(value, section, key)
}

fn required_usize(value: &JsonValue, section: &str, key: &str) -> Result<usize, TrussError> {
    value[key].as_usize().ok_or_else(|| {
        TrussError::Input(format!(
            "Input json missing non-negative integer {key} in {section}"
        ))
    })
}

fn optional_usize(
    value: &JsonValue,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TrussError> {
    if value[key].is_null() {
        return Ok(default);
    }
    required_usize(value, section, key)
}

fn optional_bool(value: &JsonValue, section: &str, key: &str, default: bool) -> Result<bool, TrussError> {
    if value[key].is_null() {
        return Ok(default);
    }
    value[key].as_bool().ok_or_else(|| {
        TrussError::Input(format!("Input json expects true or false for {key} in {section}"))
    })
}

fn optional_u64(value: &JsonValue, section: &str, key: &str, default: u64) -> Result<u64, TrussError> {
    if value[key].is_null() {
        return Ok(default);
    }
    value[key].as_u64().ok_or_else(|| {
        TrussError::Input(format!(
            "Input json expects a non-negative integer {key} in {section}"
        ))
    })
}

fn parse_point(value: &JsonValue, key: &str) -> Result<(f64, f64), TrussError> {
    let point = &value[key];
    match (point[0].as_f64(), point[1].as_f64()) {
        (Some(x), Some(y)) if point.len() == 2 => Ok((x, y)),
        _ => Err(TrussError::Input(format!(
            "{key} in mesh must be a pair of numbers"
        ))),
    }
}

fn parse_mesh(input_json: &JsonValue) -> Result<MeshConfig, TrussError> {
    let mesh = &input_json["mesh"];
    Ok(MeshConfig {
        corner1: parse_point(mesh, "corner1")?,
        corner2: parse_point(mesh, "corner2")?,
        nx: required_usize(mesh, "mesh", "nx")?,
        ny: required_usize(mesh, "mesh", "ny")?,
    })
}

fn parse_removals(input_json: &JsonValue) -> Result<(Vec<usize>, Vec<(usize, usize)>), TrussError> {
    let mut nodes = Vec::new();
    for entry in input_json["remove_nodes"].members() {
        nodes.push(entry.as_usize().ok_or_else(|| {
            TrussError::Input(format!("Bad node id {entry} in remove_nodes"))
        })?);
    }

    let mut bars = Vec::new();
    for entry in input_json["remove_bars"].members() {
        match (entry[0].as_usize(), entry[1].as_usize()) {
            (Some(a), Some(b)) if entry.len() == 2 => bars.push((a, b)),
            _ => {
                return Err(TrussError::Input(format!(
                    "Bad node pair {entry} in remove_bars"
                )))
            }
        }
    }

    Ok((nodes, bars))
}

fn parse_material(input_json: &JsonValue) -> Result<f64, TrussError> {
    let youngs_modulus = required_f64(&input_json["material"], "material", "youngs_modulus")?;
    if youngs_modulus <= 0.0 {
        return Err(TrussError::Input(format!(
            "youngs_modulus must be positive, got {youngs_modulus}"
        )));
    }
    Ok(youngs_modulus)
}

fn parse_boundary_rules(input_json: &JsonValue) -> Result<Vec<BoundaryRule>, TrussError> {
    let mut rules: Vec<BoundaryRule> = Vec::new();

    for (name, rule_json) in input_json["boundary_conditions"].entries() {
        if !rule_json.has_key("region") && !rule_json.has_key("nodes") {
            return Err(TrussError::Input(format!(
                "Boundary rule {name} needs a region or a nodes list"
            )));
        }
        if rule_json.has_key("region") && rule_json.has_key("nodes") {
            return Err(TrussError::Input(format!(
                "Boundary rule {name} has both a region and a nodes list"
            )));
        }
        if !rule_json.has_key("targets") {
            return Err(TrussError::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }

        let selector = if rule_json.has_key("region") {
            let region_json = &rule_json["region"];
            let section = format!("region of {name}");
            let region = BoundaryRegion {
                x_min: optional_f64(region_json, &section, "x_target_min", f64::MIN)?,
                x_max: optional_f64(region_json, &section, "x_target_max", f64::MAX)?,
                y_min: optional_f64(region_json, &section, "y_target_min", f64::MIN)?,
                y_max: optional_f64(region_json, &section, "y_target_max", f64::MAX)?,
            };
            if region.x_min > region.x_max {
                return Err(TrussError::Input(format!(
                    "Boundary '{name}' has x_target_min greater than x_target_max"
                )));
            }
            if region.y_min > region.y_max {
                return Err(TrussError::Input(format!(
                    "Boundary '{name}' has y_target_min greater than y_target_max"
                )));
            }
            NodeSelector::Region(region)
        } else {
            let mut nodes = Vec::new();
            for entry in rule_json["nodes"].members() {
                nodes.push(entry.as_usize().ok_or_else(|| {
                    TrussError::Input(format!("Bad node id {entry} in boundary '{name}'"))
                })?);
            }
            NodeSelector::Nodes(nodes)
        };

        let targets = &rule_json["targets"];
        let section = format!("targets of {name}");
        let rule = BoundaryRule {
            name: name.to_string(),
            selector,
            fixed: [
                optional_bool(targets, &section, "fixed_x", false)?,
                optional_bool(targets, &section, "fixed_y", false)?,
            ],
            force: [
                optional_f64(targets, &section, "fx", 0.0)?,
                optional_f64(targets, &section, "fy", 0.0)?,
            ],
        };
        if rule.fixed == [false; DOF] && rule.force == [0.0; DOF] {
            return Err(TrussError::Input(format!(
                "Boundary '{name}' neither fixes nor loads its nodes"
            )));
        }

        rules.push(rule);
    }

    info!("loaded {} boundary rules from input file", rules.len());
    Ok(rules)
}

fn parse_optimization(input_json: &JsonValue) -> Result<OptimizationConfig, TrussError> {
    let section = &input_json["optimization"];
    let method = match section["method"].as_str() {
        Some(name) => name.parse()?,
        None => Method::default(),
    };

    Ok(OptimizationConfig {
        volume_fraction: required_f64(section, "optimization", "volume_fraction")?,
        area_min: optional_f64(section, "optimization", "area_min", 1e-6)?,
        area_max: optional_f64(section, "optimization", "area_max", 1e-2)?,
        initial_area: optional_f64(section, "optimization", "initial_area", 1e-4)?,
        method,
        max_iterations: optional_usize(section, "optimization", "max_iterations", 200)?,
        tolerance: optional_f64(section, "optimization", "tolerance", 1e-4)?,
    })
}

fn parse_surrogate(input_json: &JsonValue) -> Result<Option<SurrogateSection>, TrussError> {
    let section = &input_json["surrogate"];
    if section.is_null() {
        return Ok(None);
    }

    let model = match section["model"].as_str() {
        None | Some("rbf") => ModelKind::Rbf,
        Some("mlp") => ModelKind::Mlp,
        Some(other) => {
            return Err(TrussError::Input(format!(
                "Unknown surrogate model '{other}', expected 'rbf' or 'mlp'"
            )))
        }
    };

    let defaults = SurrogateConfig::default();
    let config = SurrogateConfig {
        samples: optional_usize(section, "surrogate", "samples", defaults.samples)?,
        test_ratio: optional_f64(section, "surrogate", "test_ratio", defaults.test_ratio)?,
        validation_fraction: optional_f64(
            section,
            "surrogate",
            "validation_fraction",
            defaults.validation_fraction,
        )?,
        epochs: optional_usize(section, "surrogate", "epochs", defaults.epochs)?,
        seed: optional_u64(section, "surrogate", "seed", defaults.seed)?,
        show_progress: defaults.show_progress,
    };

    Ok(Some(SurrogateSection { model, config }))
}

/// Reads every section of a validated input json
pub fn parse_problem(input_json: &JsonValue) -> Result<ProblemConfig, TrussError> {
    let (remove_nodes, remove_bars) = parse_removals(input_json)?;
    Ok(ProblemConfig {
        mesh: parse_mesh(input_json)?,
        remove_nodes,
        remove_bars,
        youngs_modulus: parse_material(input_json)?,
        boundary_rules: parse_boundary_rules(input_json)?,
        optimization: parse_optimization(input_json)?,
        surrogate: parse_surrogate(input_json)?,
    })
}

impl ProblemConfig {
    /// Meshes the grid, applies removals and boundary rules
    ///
    /// Nodes named in `remove_nodes` lose every bar and are fixed in both
    /// axes so they do not leave zero-stiffness DOFs behind.
    pub fn build(&self) -> Result<(Geometry, LoadCase), TrussError> {
        let mesh = &self.mesh;
        let (nodes, mut bars) = mesh_grid(mesh.corner1, mesh.corner2, mesh.nx, mesh.ny)?;

        for node in &self.remove_nodes {
            if *node >= nodes.len() {
                return Err(TrussError::Input(format!(
                    "Cannot remove unknown node {node}"
                )));
            }
            bars = remove_node(&bars, *node);
        }
        for (a, b) in &self.remove_bars {
            if let BarRemoval::Removed(remaining) = remove_bar(&bars, *a, *b) {
                bars = remaining;
            }
        }

        let geometry = Geometry::new(nodes, bars)?;
        let mut load_case = LoadCase::uniform(&geometry, self.youngs_modulus)?;

        for node in &self.remove_nodes {
            load_case = load_case.fix(*node, [true; DOF])?;
        }

        for rule in &self.boundary_rules {
            let selected: Vec<usize> = match &rule.selector {
                NodeSelector::Region(region) => geometry
                    .nodes()
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| region.contains(v.x, v.y))
                    .map(|(i, _)| i)
                    .collect(),
                NodeSelector::Nodes(ids) => ids.clone(),
            };
            if selected.is_empty() {
                return Err(TrussError::Input(format!(
                    "Boundary rule '{}' selects no nodes",
                    rule.name
                )));
            }
            for node in selected {
                load_case = load_case.fix(node, rule.fixed)?.apply_load(node, rule.force)?;
            }
        }

        info!(
            "built truss with {} nodes, {} bars and {} free DOFs",
            geometry.node_count(),
            geometry.bar_count(),
            load_case.free_count()
        );
        Ok((geometry, load_case))
    }

    /// Optimization settings for a truss of `bars` members
    pub fn settings(&self, bars: usize, show_progress: bool) -> Result<OptimizationSettings, TrussError> {
        let opt = &self.optimization;
        Ok(OptimizationSettings {
            volume_fraction: opt.volume_fraction,
            bounds: DesignBounds::uniform(bars, opt.area_min, opt.area_max)?,
            x0: vec![opt.initial_area; bars],
            method: opt.method,
            options: SolverOptions {
                max_iterations: opt.max_iterations,
                tolerance: opt.tolerance,
                show_progress,
                ..SolverOptions::default()
            },
        })
    }
}
