pub mod core;
pub mod device;
pub mod indices;
pub mod parser;
