//! Page boundary splitter.
//!
//! Offsets are byte indices into the reply buffer and always fall on char
//! boundaries. Lengths (`max_len`) are counted in characters, which is how
//! messaging surfaces measure their limits.

/// Find the exclusive end of the page starting at `start`.
///
/// Returns the end of the last `cut_chars` character within the first
/// `max_len` characters of `text[start..]`, or the hard limit when there is
/// none. A cut never lands inside a markup tag such as
/// `<pre language="python">`; a hard limit inside one moves back to the
/// tag's `<`. When the remaining text already fits, returns `text.len()`.
pub fn find_cut(text: &str, start: usize, max_len: usize, cut_chars: &[char]) -> usize {
    let max_len = max_len.max(1);
    let tail = &text[start..];

    let limit = match tail.char_indices().nth(max_len) {
        Some((idx, _)) => start + idx,
        None => return text.len(),
    };

    let soft = text[start..limit]
        .char_indices()
        .rev()
        .filter(|(_, c)| cut_chars.contains(c))
        .map(|(idx, c)| start + idx + c.len_utf8())
        .find(|&end| open_tag_at(text, start, end).is_none());

    match soft {
        Some(end) => end,
        None => match open_tag_at(text, start, limit) {
            Some(lt) if lt > start => lt,
            _ => limit,
        },
    }
}

/// Offset of the `<` of a tag left open at `end`, if any.
fn open_tag_at(text: &str, start: usize, end: usize) -> Option<usize> {
    text[start..end]
        .char_indices()
        .rev()
        .find(|(_, c)| *c == '<' || *c == '>')
        .filter(|(_, c)| *c == '<')
        .map(|(idx, _)| start + idx)
}

/// Number of characters in `text[start..end]`.
pub fn char_len(text: &str, start: usize, end: usize) -> usize {
    text[start..end].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUTS: [char; 3] = ['\n', ' ', '\t'];

    #[test]
    fn cuts_after_last_whitespace() {
        let text = "hello world foo";
        let end = find_cut(text, 0, 13, &CUTS);
        assert_eq!(&text[..end], "hello world ");
    }

    #[test]
    fn hard_cut_without_cut_chars() {
        let text = "a".repeat(50);
        assert_eq!(find_cut(&text, 0, 20, &CUTS), 20);
        assert_eq!(find_cut(&text, 20, 20, &CUTS), 40);
    }

    #[test]
    fn fitting_tail_returns_text_len() {
        let text = "short text";
        assert_eq!(find_cut(text, 0, 100, &CUTS), text.len());
        assert_eq!(find_cut(text, 6, 4, &CUTS), text.len());
    }

    #[test]
    fn prefers_newline_when_it_is_last() {
        let text = "line one\nline two continues";
        let end = find_cut(text, 0, 12, &CUTS);
        assert_eq!(&text[..end], "line one\n");
    }

    #[test]
    fn cut_at_start_still_advances() {
        let text = " abcdefghij";
        let end = find_cut(text, 0, 5, &CUTS);
        assert_eq!(end, 1);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "ééééé ééééé";
        let end = find_cut(text, 0, 8, &CUTS);
        assert_eq!(&text[..end], "ééééé ");
        assert_eq!(char_len(text, 0, end), 6);

        let no_space = "日本語日本語";
        let end = find_cut(no_space, 0, 4, &CUTS);
        assert_eq!(&no_space[..end], "日本語日");
    }

    #[test]
    fn never_cuts_inside_a_tag() {
        let text = "intro <pre language=\"python\">print(1)</pre>";
        let end = find_cut(text, 0, 20, &CUTS);
        assert_eq!(&text[..end], "intro ");

        let text = "<b>bold</b> <i>x</i> and <a href=\"u\">link</a>";
        let end = find_cut(text, 0, 29, &CUTS);
        assert_eq!(&text[..end], "<b>bold</b> <i>x</i> and ");
    }

    #[test]
    fn hard_limit_inside_tag_moves_before_it() {
        let text = "abcdefgh<code>xyz</code>";
        let end = find_cut(text, 0, 10, &CUTS);
        assert_eq!(&text[..end], "abcdefgh");
    }

    #[test]
    fn tag_at_page_start_falls_back_to_hard_limit() {
        let text = "<pre language=\"python\">";
        assert_eq!(find_cut(text, 0, 5, &CUTS), 5);
    }

    #[test]
    fn end_always_within_bounds() {
        let text = "The quick brown fox\njumps over\tthe lazy dog, again and again.";
        for start in [0usize, 4, 10, 20] {
            for max_len in 1..30 {
                if char_len(text, start, text.len()) <= max_len {
                    continue;
                }
                let end = find_cut(text, start, max_len, &CUTS);
                assert!(end > start);
                assert!(char_len(text, start, end) <= max_len);
                let window: String = text[start..].chars().take(max_len).collect();
                if window.contains(CUTS) {
                    let last = text[..end].chars().next_back().unwrap();
                    assert!(CUTS.contains(&last) || char_len(text, start, end) == max_len);
                }
            }
        }
    }
}
