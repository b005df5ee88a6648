//! Hand-written scanner for attribute spans, tag spans, and free-text normalization.
//!
//! Matching is left to right and first match wins. Attribute spans are recognised before tag
//! spans, and tag spans before plain whitespace-delimited words.

const ATTRIBUTE_OPEN: &str = "[att:";
const ATTRIBUTE_CLOSE: &str = "[/att]";

/// Piece of record text after attribute extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    /// Untouched text between attribute spans.
    Text(&'a str),
    /// A matched `[att:NAME]VALUE[/att]` span, untrimmed.
    Attribute { name: &'a str, value: &'a str },
}

/// Segment of record text after tag segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    /// Free text still to be normalised.
    Text(&'a str),
    /// A `#word` or `@word` span, symbol included.
    Tag(&'a str),
}

/// Splits `text` into free text and attribute spans.
///
/// NAME runs to the first `]`, VALUE to the first `[/att]`; neither may cross a newline. An
/// opening marker without a complete span is left as literal text.
pub(crate) fn split_attributes(text: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut literal_start = 0usize;
    let mut cursor = 0usize;

    while let Some(offset) = text[cursor..].find(ATTRIBUTE_OPEN) {
        let open = cursor + offset;
        match match_attribute(text, open) {
            Some((name, value, end)) => {
                if open > literal_start {
                    pieces.push(Piece::Text(&text[literal_start..open]));
                }
                pieces.push(Piece::Attribute { name, value });
                literal_start = end;
                cursor = end;
            }
            None => cursor = open + 1,
        }
    }
    if literal_start < text.len() {
        pieces.push(Piece::Text(&text[literal_start..]));
    }
    pieces
}

fn match_attribute(text: &str, open: usize) -> Option<(&str, &str, usize)> {
    let name_start = open + ATTRIBUTE_OPEN.len();
    let name_len = text[name_start..].find(']')?;
    let name = &text[name_start..name_start + name_len];
    if name.contains('\n') {
        return None;
    }
    let value_start = name_start + name_len + 1;
    let value_len = text[value_start..].find(ATTRIBUTE_CLOSE)?;
    let value = &text[value_start..value_start + value_len];
    if value.contains('\n') {
        return None;
    }
    Some((name, value, value_start + value_len + ATTRIBUTE_CLOSE.len()))
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Splits free text into tag spans and the text around them.
pub(crate) fn split_tags(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut literal_start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch != '#' && ch != '@' {
            continue;
        }
        let mut end = idx + ch.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if !is_word_char(next) {
                break;
            }
            end = next_idx + next.len_utf8();
            chars.next();
        }
        if end == idx + ch.len_utf8() {
            continue;
        }
        if idx > literal_start {
            segments.push(Segment::Text(&text[literal_start..idx]));
        }
        segments.push(Segment::Tag(&text[idx..end]));
        literal_start = end;
    }
    if literal_start < text.len() {
        segments.push(Segment::Text(&text[literal_start..]));
    }
    segments
}

fn is_kept(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '#' | '@' | '<' | '>' | '_')
}

/// Collapses every run of characters outside the kept set into one space and trims.
///
/// A `.` or `,` between two ASCII digits is kept so decimals keep their source form.
/// Returns `None` when nothing remains.
pub(crate) fn normalize(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for (idx, &ch) in chars.iter().enumerate() {
        let decimal_mark = matches!(ch, '.' | ',')
            && idx > 0
            && chars[idx - 1].is_ascii_digit()
            && chars.get(idx + 1).is_some_and(char::is_ascii_digit);
        if is_kept(ch) || decimal_mark {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Integer or decimal: `^[0-9]+([.,][0-9]+)?$`.
pub(crate) fn is_number(piece: &str) -> bool {
    let (integer, fraction) = match piece.find(['.', ',']) {
        Some(idx) => (&piece[..idx], Some(&piece[idx + 1..])),
        None => (piece, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    all_digits(integer) && fraction.map_or(true, all_digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_spans_are_extracted_in_place() {
        let pieces = split_attributes("buy [att:color] red [/att] now");
        assert_eq!(
            pieces,
            vec![
                Piece::Text("buy "),
                Piece::Attribute {
                    name: "color",
                    value: " red "
                },
                Piece::Text(" now"),
            ]
        );
    }

    #[test]
    fn unmatched_attribute_stays_literal() {
        assert_eq!(
            split_attributes("[att:color]red"),
            vec![Piece::Text("[att:color]red")]
        );
        assert_eq!(
            split_attributes("[att:a]x\ny[/att]"),
            vec![Piece::Text("[att:a]x\ny[/att]")]
        );
    }

    #[test]
    fn leftmost_open_marker_wins() {
        let pieces = split_attributes("[att:[att:a]b[/att]");
        assert_eq!(
            pieces,
            vec![Piece::Attribute {
                name: "[att:a",
                value: "b"
            }]
        );
    }

    #[test]
    fn adjacent_attributes_produce_no_empty_text() {
        let pieces = split_attributes("[att:a]1[/att][att:b]2[/att]");
        assert_eq!(pieces.len(), 2);
    }

    #[test]
    fn tags_split_free_text() {
        assert_eq!(
            split_tags("abc#sale and @bob!"),
            vec![
                Segment::Text("abc"),
                Segment::Tag("#sale"),
                Segment::Text(" and "),
                Segment::Tag("@bob"),
                Segment::Text("!"),
            ]
        );
        assert_eq!(split_tags("a # b"), vec![Segment::Text("a # b")]);
        assert_eq!(split_tags("##x"), vec![Segment::Text("#"), Segment::Tag("#x")]);
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("  red,  green;;blue "), Some("red green blue".into()));
        assert_eq!(normalize("<b>x_y</b>"), Some("<b>x_y< b>".into()));
        assert_eq!(normalize("costs 3.0 or 1,5."), Some("costs 3.0 or 1,5".into()));
        assert_eq!(normalize("!!! ..."), None);
    }

    #[test]
    fn numbers_match_integer_or_decimal() {
        assert!(is_number("3"));
        assert!(is_number("3.0"));
        assert!(is_number("10,25"));
        assert!(!is_number("3."));
        assert!(!is_number(".5"));
        assert!(!is_number("3a"));
        assert!(!is_number("1.2.3"));
    }
}
