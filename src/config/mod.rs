pub mod monitor;
pub mod rules;

pub use monitor::MonitorConfig;
pub use rules::{RiskRules, SourceWeights};
