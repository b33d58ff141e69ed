//! Sender blacklist and spam-pattern checks, shared by both directions.

/// Exact-match check of an opaque sender identity against the blacklist.
pub fn is_blacklisted(identity: &str, blacklist: &[String]) -> bool {
    blacklist.iter().any(|entry| entry == identity)
}

/// Case-insensitive substring match against the spam patterns, first match
/// short-circuits. An empty pattern list never matches. Runs on sanitized
/// text, so patterns see the human-readable form.
pub fn contains_spam(text: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let lowered = text.to_lowercase();
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| lowered.contains(&p.to_lowercase()))
}
