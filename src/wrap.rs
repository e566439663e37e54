//! Display-width aware line wrapping.

/// Column width of a character on screen.
///
/// Anything outside ASCII is treated as full width. This over-counts some
/// narrow non-ASCII glyphs, which only costs a little margin.
pub fn char_width(c: char) -> usize {
    if c.len_utf8() > 1 {
        2
    } else {
        1
    }
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Splits `line` into chunks that each fit in roughly `width` columns.
///
/// `width` is rounded down to an even number so a full-width glyph never
/// straddles the edge. The character that reaches the limit still belongs to
/// the current chunk, so a chunk may overflow by that one character.
/// Concatenating the chunks gives back `line`, and an empty line yields one
/// empty chunk so every line occupies at least one row.
pub fn wrap(line: &str, width: usize) -> Vec<String> {
    let limit = (width - width % 2).max(2);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut used = 0;

    for c in line.chars() {
        used += char_width(c);
        current.push(c);
        if used >= limit {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_is_one_empty_row() {
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn short_line_is_untouched() {
        assert_eq!(wrap("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn ascii_breaks_at_even_width() {
        assert_eq!(wrap("abcdefghij", 7), vec!["abcdef", "ghij"]);
    }

    #[test]
    fn line_filling_exactly_has_no_trailing_row() {
        assert_eq!(wrap("abcd", 4), vec!["abcd"]);
    }

    #[test]
    fn wide_glyph_counts_double() {
        assert_eq!(display_width("あいう"), 6);
        assert_eq!(display_width("aあ"), 3);
        assert_eq!(wrap("あいうえお", 6), vec!["あいう", "えお"]);
    }

    #[test]
    fn overflow_is_at_most_one_glyph() {
        // "a" + "あ" takes three columns of a four column limit, the next
        // wide glyph reaches it and is kept in the same chunk.
        let chunks = wrap("aあいう", 4);
        assert_eq!(chunks, vec!["aあい", "う"]);
        assert_eq!(display_width(&chunks[0]), 5);
    }

    #[test]
    fn chunks_reassemble_and_stay_within_bounds() {
        let lines = [
            "The quick brown fox jumps over the lazy dog",
            "吾輩は猫である。名前はまだ無い。どこで生れたかとんと見当がつかぬ。",
            "mixed ａｂｃ 「引用」 text 123",
        ];
        for width in [2, 3, 8, 11, 20, 80] {
            for line in lines {
                let chunks = wrap(line, width);
                assert_eq!(chunks.concat(), line);
                let limit = (width - width % 2).max(2);
                for chunk in &chunks {
                    let last = chunk.chars().last().map_or(0, char_width);
                    assert!(display_width(chunk) - last < limit, "{chunk:?} @ {width}");
                }
            }
        }
    }

    #[test]
    fn tiny_width_still_makes_progress() {
        assert_eq!(wrap("abc", 0), vec!["ab", "c"]);
    }
}
