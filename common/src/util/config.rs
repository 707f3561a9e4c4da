use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub routing: RouterConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routing: RouterConfig::default(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name} = {value} must be greater than {bound}")]
    NotAbove {
        name: &'static str,
        value: f64,
        bound: f64,
    },
    #[error("{name} = {value} must be at least {bound}")]
    Below {
        name: &'static str,
        value: f64,
        bound: f64,
    },
}

/// Tuned base costs per resource class. Length-scaled entries are multiplied
/// by the resource length in tiles.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BaseCostTable {
    #[serde(default = "default_wire_cost")]
    pub wire: f32,
    #[serde(default = "default_double_cost")]
    pub double: f32,
    #[serde(default = "default_hquad_cost")]
    pub hquad: f32,
    #[serde(default = "default_vquad_cost")]
    pub vquad: f32,
    #[serde(default = "default_hlong_cost")]
    pub hlong: f32,
    #[serde(default = "default_vlong_cost")]
    pub vlong: f32,
    #[serde(default = "default_pin_cost")]
    pub pin: f32,
    #[serde(default = "default_source_pin_cost")]
    pub source_pin: f32,
    #[serde(default = "default_sink_pin_cost")]
    pub sink_pin: f32,
}

impl Default for BaseCostTable {
    fn default() -> Self {
        Self {
            wire: default_wire_cost(),
            double: default_double_cost(),
            hquad: default_hquad_cost(),
            vquad: default_vquad_cost(),
            hlong: default_hlong_cost(),
            vlong: default_vlong_cost(),
            pin: default_pin_cost(),
            source_pin: default_source_pin_cost(),
            sink_pin: default_sink_pin_cost(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_true")]
    pub use_bounding_box: bool,
    #[serde(default = "default_bbox_ext_x")]
    pub bounding_box_extension_x: i32,
    #[serde(default = "default_bbox_ext_y")]
    pub bounding_box_extension_y: i32,
    #[serde(default)]
    pub enlarge_bounding_box: bool,
    #[serde(default = "default_ext_x_increment")]
    pub extension_x_increment: i32,
    #[serde(default = "default_ext_y_increment")]
    pub extension_y_increment: i32,
    #[serde(default = "default_wirelength_weight")]
    pub wirelength_weight: f32,
    #[serde(default = "default_timing_weight")]
    pub timing_weight: f32,
    #[serde(default = "default_timing_multiplier")]
    pub timing_multiplier: f32,
    #[serde(default = "default_share_exponent")]
    pub share_exponent: f32,
    #[serde(default = "default_criticality_exponent")]
    pub criticality_exponent: f32,
    #[serde(default = "default_min_reroute_criticality")]
    pub min_reroute_criticality: f32,
    #[serde(default = "default_reroute_percentage")]
    pub reroute_percentage: u32,
    #[serde(default = "default_initial_present_congestion_factor")]
    pub initial_present_congestion_factor: f32,
    #[serde(default = "default_present_congestion_multiplier")]
    pub present_congestion_multiplier: f32,
    #[serde(default = "default_historical_congestion_factor")]
    pub historical_congestion_factor: f32,
    #[serde(default = "default_true")]
    pub timing_driven: bool,
    #[serde(default)]
    pub mask_nodes_cross_rclk: bool,
    #[serde(default)]
    pub use_u_turn_nodes: bool,
    #[serde(default)]
    pub soft_preserve: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub base_cost: BaseCostTable,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            use_bounding_box: default_true(),
            bounding_box_extension_x: default_bbox_ext_x(),
            bounding_box_extension_y: default_bbox_ext_y(),
            enlarge_bounding_box: false,
            extension_x_increment: default_ext_x_increment(),
            extension_y_increment: default_ext_y_increment(),
            wirelength_weight: default_wirelength_weight(),
            timing_weight: default_timing_weight(),
            timing_multiplier: default_timing_multiplier(),
            share_exponent: default_share_exponent(),
            criticality_exponent: default_criticality_exponent(),
            min_reroute_criticality: default_min_reroute_criticality(),
            reroute_percentage: default_reroute_percentage(),
            initial_present_congestion_factor: default_initial_present_congestion_factor(),
            present_congestion_multiplier: default_present_congestion_multiplier(),
            historical_congestion_factor: default_historical_congestion_factor(),
            timing_driven: default_true(),
            mask_nodes_cross_rclk: false,
            use_u_turn_nodes: false,
            soft_preserve: false,
            parallel: false,
            base_cost: BaseCostTable::default(),
        }
    }
}

impl RouterConfig {
    /// Rejects option values the cost function cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        unit_range("wirelength_weight", self.wirelength_weight)?;
        unit_range("timing_weight", self.timing_weight)?;
        unit_range("min_reroute_criticality", self.min_reroute_criticality)?;
        in_range(
            "reroute_percentage",
            self.reroute_percentage as f64,
            0.0,
            100.0,
        )?;
        above(
            "present_congestion_multiplier",
            self.present_congestion_multiplier as f64,
            1.0,
        )?;
        above(
            "initial_present_congestion_factor",
            self.initial_present_congestion_factor as f64,
            0.0,
        )?;
        above(
            "criticality_exponent",
            self.criticality_exponent as f64,
            0.0,
        )?;
        at_least("timing_multiplier", self.timing_multiplier as f64, 1.0)?;
        at_least(
            "historical_congestion_factor",
            self.historical_congestion_factor as f64,
            0.0,
        )?;
        at_least("share_exponent", self.share_exponent as f64, 0.0)?;
        at_least("max_iterations", self.max_iterations as f64, 1.0)?;
        at_least(
            "bounding_box_extension_x",
            self.bounding_box_extension_x as f64,
            0.0,
        )?;
        at_least(
            "bounding_box_extension_y",
            self.bounding_box_extension_y as f64,
            0.0,
        )?;
        at_least(
            "extension_x_increment",
            self.extension_x_increment as f64,
            0.0,
        )?;
        at_least(
            "extension_y_increment",
            self.extension_y_increment as f64,
            0.0,
        )?;

        let b = &self.base_cost;
        for (name, value) in [
            ("base_cost.wire", b.wire),
            ("base_cost.double", b.double),
            ("base_cost.hquad", b.hquad),
            ("base_cost.vquad", b.vquad),
            ("base_cost.hlong", b.hlong),
            ("base_cost.vlong", b.vlong),
            ("base_cost.pin", b.pin),
            ("base_cost.source_pin", b.source_pin),
            ("base_cost.sink_pin", b.sink_pin),
        ] {
            at_least(name, value as f64, 0.0)?;
        }
        Ok(())
    }
}

fn unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    in_range(name, value as f64, 0.0, 1.0)
}

fn in_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn above(name: &'static str, value: f64, bound: f64) -> Result<(), ConfigError> {
    // NaN fails this comparison as well
    if !(value > bound) {
        return Err(ConfigError::NotAbove { name, value, bound });
    }
    Ok(())
}

fn at_least(name: &'static str, value: f64, bound: f64) -> Result<(), ConfigError> {
    if !(value >= bound) {
        return Err(ConfigError::Below { name, value, bound });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_fabric_file")]
    pub fabric_file: String,
    #[serde(default = "default_netlist_file")]
    pub netlist_file: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            fabric_file: default_fabric_file(),
            netlist_file: default_netlist_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_routed_netlist")]
    pub routed_netlist: String,
    #[serde(default)]
    pub heat_map: Option<String>,
    #[serde(default = "default_heat_map_size")]
    pub heat_map_size: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            routed_netlist: default_routed_netlist(),
            heat_map: None,
            heat_map_size: default_heat_map_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> usize {
    100
}

fn default_bbox_ext_x() -> i32 {
    3
}

fn default_bbox_ext_y() -> i32 {
    15
}

fn default_ext_x_increment() -> i32 {
    1
}

fn default_ext_y_increment() -> i32 {
    2
}

fn default_wirelength_weight() -> f32 {
    0.8
}

fn default_timing_weight() -> f32 {
    0.35
}

fn default_timing_multiplier() -> f32 {
    1.0
}

fn default_share_exponent() -> f32 {
    2.0
}

fn default_criticality_exponent() -> f32 {
    3.0
}

fn default_min_reroute_criticality() -> f32 {
    0.85
}

fn default_reroute_percentage() -> u32 {
    3
}

fn default_initial_present_congestion_factor() -> f32 {
    0.5
}

fn default_present_congestion_multiplier() -> f32 {
    2.0
}

fn default_historical_congestion_factor() -> f32 {
    1.0
}

fn default_wire_cost() -> f32 {
    0.4
}

fn default_double_cost() -> f32 {
    0.4
}

fn default_hquad_cost() -> f32 {
    0.35
}

fn default_vquad_cost() -> f32 {
    0.15
}

fn default_hlong_cost() -> f32 {
    0.15
}

fn default_vlong_cost() -> f32 {
    0.7
}

fn default_pin_cost() -> f32 {
    0.4
}

fn default_source_pin_cost() -> f32 {
    1.0
}

fn default_sink_pin_cost() -> f32 {
    0.4
}

fn default_fabric_file() -> String {
    "inputs/random.fab".to_string()
}

fn default_netlist_file() -> String {
    "inputs/random.nets".to_string()
}

fn default_routed_netlist() -> String {
    "output/routed.nets".to_string()
}

fn default_heat_map_size() -> u32 {
    1000
}
