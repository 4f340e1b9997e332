/// Joins the two participant ids of a conversation key. Staff ids holding
/// it are refused by [`crate::repository::get_or_create`].
pub const SEPARATOR: char = '_';

/// The participant pair in key order: lexicographically smaller first.
pub fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Conversation key for two participants. Commutative in its arguments.
pub fn chat_id(a: &str, b: &str) -> String {
    let (first, second) = ordered(a, b);
    format!("{first}{SEPARATOR}{second}")
}
