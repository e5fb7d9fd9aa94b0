pub mod desktop;
pub mod fake;
pub mod graph;
