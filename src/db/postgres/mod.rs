mod cost_records;
mod insights;

pub use cost_records::*;
pub use insights::*;

/// Render `(${start}, ..., ${start + width - 1})` for multi-row inserts.
pub(crate) fn placeholder_tuple(start: usize, width: usize) -> String {
    let mut out = String::from("(");
    for i in 0..width {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('$');
        out.push_str(&(start + i).to_string());
    }
    out.push(')');
    out
}
