//! Interleave merge of prefix and middle phrase lists.
//!
//! `|` markers in either list switch which list words are taken from, so a template like
//! `front, |, back` can have scene-specific phrases spliced in at the marker instead of only
//! appended. Example: prefix `1girl, |, character` and middle `style, |, pose` produce
//! `1girl, style, character, pose`.

/// Token that switches the active list.
pub const INTERLEAVE_MARKER: &str = "|";

/// Merge `prefix` and `middle` at their markers, then append `suffix`.
///
/// Once either list runs out, the rest of the other is appended with markers dropped.
/// With no markers at all this is plain `prefix ++ middle ++ suffix`.
pub fn combine<A, B, C>(prefix: &[A], middle: &[B], suffix: &[C]) -> Vec<String>
where
    A: AsRef<str>,
    B: AsRef<str>,
    C: AsRef<str>,
{
    let mut out = Vec::with_capacity(prefix.len() + middle.len() + suffix.len());
    let (mut left, mut right) = (0, 0);
    let mut from_prefix = true;

    while left < prefix.len() && right < middle.len() {
        let word = if from_prefix {
            left += 1;
            as_str(&prefix[left - 1])
        } else {
            right += 1;
            as_str(&middle[right - 1])
        };
        if word == INTERLEAVE_MARKER {
            from_prefix = !from_prefix;
        } else {
            out.push(word.to_string());
        }
    }

    let prefix_tail = prefix[left..].iter().map(as_str);
    let middle_tail = middle[right..].iter().map(as_str);
    out.extend(
        prefix_tail
            .chain(middle_tail)
            .filter(|w| *w != INTERLEAVE_MARKER)
            .map(str::to_string),
    );
    out.extend(suffix.iter().map(as_str).map(str::to_string));
    out
}

fn as_str<T: AsRef<str>>(word: &T) -> &str {
    word.as_ref()
}
