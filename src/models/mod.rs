mod cost_record;
mod insight;

pub use cost_record::*;
pub use insight::*;
