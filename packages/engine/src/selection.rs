use tandem_markup::{Document, Span};

/// Widen a range to line granularity when it is line-shaped.
///
/// The start moves to its line start when only whitespace precedes it on the
/// line; the end moves past the line terminator when only whitespace follows
/// it. A range sharing its line with other content is left alone, so deleting
/// an element never swallows neighbouring text.
pub fn widen_to_lines(text: &str, range: Span) -> Span {
    // Wire offsets are not trusted to land on char boundaries.
    let mut start = floor_char_boundary(text, range.start);
    let mut end = ceil_char_boundary(text, range.end);

    let ls = line_start(text, start);
    if text[ls..start].chars().all(char::is_whitespace) {
        start = ls;
    }

    match text[end..].find('\n') {
        Some(pos) if text[end..end + pos].chars().all(char::is_whitespace) => {
            end += pos + 1;
        }
        None if text[end..].chars().all(char::is_whitespace) => {
            end = text.len();
        }
        _ => {}
    }

    Span::new(start, end)
}

/// The extracted block for the clipboard: the range's text with the first
/// line's indentation stripped from every following line.
pub fn extract_dedented(text: &str, range: Span) -> String {
    let start = floor_char_boundary(text, range.start);
    let end = ceil_char_boundary(text, range.end).max(start);
    let block = &text[start..end];

    let ls = line_start(text, start);
    let indent_len = text[ls..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(char::len_utf8)
        .sum::<usize>();
    let indent = &text[ls..ls + indent_len];
    if indent.is_empty() {
        return block.to_string();
    }

    let mut lines = block.split('\n');
    let mut out = String::with_capacity(block.len());
    if let Some(first) = lines.next() {
        out.push_str(first);
    }
    for line in lines {
        out.push('\n');
        out.push_str(line.strip_prefix(indent).unwrap_or(line));
    }
    out
}

/// Sort and coalesce overlapping or touching ranges so a multi-range delete
/// is one set of disjoint edits.
pub fn merge_ranges(mut ranges: Vec<Span>) -> Vec<Span> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut out: Vec<Span> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match out.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => out.push(range),
        }
    }
    out
}

/// The deepest element whose span covers the range, for highlight broadcast.
pub fn covering_element_range(doc: &Document, range: Span) -> Option<Span> {
    let mut found = None;
    doc.visit_elements(&mut |el| {
        if el.span.covers(&range) {
            // descendants visit after ancestors, so the last hit is deepest
            found = Some(el.span);
        }
    });
    found
}

fn line_start(text: &str, offset: usize) -> usize {
    match text[..floor_char_boundary(text, offset)].rfind('\n') {
        Some(pos) => pos + 1,
        None => 0,
    }
}

/// Largest char boundary at or below `offset`, clamped to the text.
fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Smallest char boundary at or above `offset`, clamped to the text.
fn ceil_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset += 1;
    }
    offset
}
