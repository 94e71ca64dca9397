mod collector;
mod domain;
mod resolver;

pub use collector::{Collector, CycleReport, Target};
