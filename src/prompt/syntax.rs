//! Bracket balance checking for prompt text.
//!
//! Emphasis and piece syntax use `()`, `[]`, `{}` and `<>`. A phrase that is exactly an
//! emoticon such as `:(` or `><` is not treated as bracket syntax.

const OPENERS: [char; 4] = ['(', '[', '{', '<'];
const CLOSERS: [char; 4] = [')', ']', '}', '>'];
const EYES: [char; 2] = [':', ';'];
const MOUTHS: [char; 6] = ['<', '>', '(', ')', '{', '}'];

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\u{a0}'
}

fn is_emoticon(phrase: &[char]) -> bool {
    match phrase {
        ['>', '<'] => true,
        [eye, mouth] => EYES.contains(eye) && MOUTHS.contains(mouth),
        _ => false,
    }
}

/// Replace emoticon phrases with neutral characters, keeping every char position intact.
fn mask_emoticons(text: &str) -> Vec<char> {
    let mut chars: Vec<char> = text.chars().collect();
    let mut start = 0;
    while start <= chars.len() {
        let end = chars[start..]
            .iter()
            .position(|c| *c == ',')
            .map(|i| start + i)
            .unwrap_or(chars.len());
        let segment = &chars[start..end];
        if let (Some(lo), Some(hi)) = (
            segment.iter().position(|c| !is_blank(*c)),
            segment.iter().rposition(|c| !is_blank(*c)),
        ) && is_emoticon(&segment[lo..=hi])
        {
            for c in &mut chars[start + lo..=start + hi] {
                *c = 'x';
            }
        }
        start = end + 1;
    }
    chars
}

/// Check that brackets in `text` are balanced and properly nested.
///
/// On failure returns the char index of the offending bracket: a closer with no opener, the
/// opener a mismatched closer was paired with, or the innermost opener left unclosed.
pub fn check_brackets(text: &str) -> Result<(), usize> {
    let chars = mask_emoticons(text);
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for (pos, c) in chars.iter().enumerate() {
        if let Some(kind) = OPENERS.iter().position(|o| o == c) {
            stack.push((kind, pos));
        } else if let Some(kind) = CLOSERS.iter().position(|o| o == c) {
            match stack.pop() {
                None => return Err(pos),
                Some((open_kind, open_pos)) if open_kind != kind => return Err(open_pos),
                Some(_) => {}
            }
        }
    }
    match stack.pop() {
        Some((_, open_pos)) => Err(open_pos),
        None => Ok(()),
    }
}
