/// Single-line, char-bounded excerpt of an upstream body for diagnostics.
pub fn preview(text: &str, limit: usize) -> String {
    let flat = text.trim().replace(['\n', '\r'], " ");
    if flat.chars().count() <= limit {
        return flat;
    }
    let mut out: String = flat.chars().take(limit).collect();
    out.push_str("...");
    out
}
