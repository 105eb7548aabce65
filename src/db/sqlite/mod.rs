mod cost_records;
mod insights;

pub use cost_records::*;
pub use insights::*;
