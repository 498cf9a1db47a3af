/// Permissive syntactic email check, equivalent to the pattern
/// `^[^\s@]+@[^\s@]+\.[^\s]+$`: something before the `@`, something between
/// the `@` and a dot, something after the dot, no whitespace anywhere.
/// Deliverability is the provider's problem.
pub fn is_valid_email(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    // The run between `@` and the dot may not contain another `@`; the
    // part after the dot may.
    let at_bound = domain.find('@').unwrap_or(domain.len());
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i >= 1 && i < at_bound && i + 1 < domain.len())
}
