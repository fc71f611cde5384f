//! Search folding for Arabic script.
//!
//! Canonical text is fully vocalized, while queries are usually typed
//! without marks. Both sides of a full-text match go through [`fold`], which
//! removes the marks and collapses alef variants, so a plain-letter query
//! finds vocalized verses and a vocalized query finds the same ones.
//!
//! Text outside the Arabic block passes through unchanged.

/// Arabic combining marks: harakat, tanween, shadda, sukun, superscript alef
/// and the Quranic annotation signs.
fn is_arabic_mark(c: char) -> bool {
    matches!(c,
        '\u{0610}'..='\u{061A}'
        | '\u{064B}'..='\u{065F}'
        | '\u{0670}'
        | '\u{06D6}'..='\u{06DC}'
        | '\u{06DF}'..='\u{06E4}'
        | '\u{06E7}'..='\u{06E8}'
        | '\u{06EA}'..='\u{06ED}'
    )
}

/// Fold `text` into its searchable form.
pub fn fold(text: &str) -> String {
    text.chars()
        .filter(|&c| !is_arabic_mark(c) && c != '\u{0640}')
        .map(|c| match c {
            // alef with madda, hamza above, hamza below, wasla
            '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => '\u{0627}',
            other => other,
        })
        .collect()
}
