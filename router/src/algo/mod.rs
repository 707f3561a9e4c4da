pub mod direct;
pub mod maze;
pub mod repair;
