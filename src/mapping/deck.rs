//! Deck inference from group identifiers

/// Extract the deck number from a group like `[Channel3]`.
///
/// Only the exact `[Channel<digits>]` form carries a deck. Master, effect
/// unit, sampler groups and anything malformed resolve to `None`, which is a
/// normal outcome rather than an error.
pub fn resolve_deck(group: &str) -> Option<u32> {
    let digits = group.strip_prefix("[Channel")?.strip_suffix(']')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
