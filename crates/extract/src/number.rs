/// Convert a counter as GitHub renders it into a number.
///
/// Comma grouping is removed, and a `k` suffix multiplies by a thousand
/// (rounded, since the shorthand is lossy anyway). Returns `None` for empty
/// or non-numeric text.
///
/// ```
/// use gharvest_extract::text_to_number;
/// assert_eq!(text_to_number("1,234"), Some(1234));
/// assert_eq!(text_to_number("14.2k"), Some(14200));
/// assert_eq!(text_to_number("many"), None);
/// ```
pub fn text_to_number(text: &str) -> Option<u64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.contains('k') {
        let value: f64 = cleaned.replace('k', "").trim().parse().ok()?;
        let scaled = (value * 1000.0).round();
        return (scaled.is_finite() && scaled >= 0.0).then_some(scaled as u64);
    }
    cleaned.parse().ok()
}
