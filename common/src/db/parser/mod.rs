pub mod fabric;
pub mod netlist;
