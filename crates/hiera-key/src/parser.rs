//! Key string parser
//!
//! Splits a key on `.` while honoring single and double quotes:
//! - `a.b.c` has three segments
//! - `a.'b.c'` has two segments, the second being `b.c`
//! - `a."1"` keeps `1` as a name instead of an index

use crate::{KeyError, Segment};

/// Segment under construction
#[derive(Default)]
struct Pending {
    text: String,
    quoted: bool,
}

/// Parse a key string into its segments
pub fn parse_segments(source: &str) -> Result<Vec<Segment>, KeyError> {
    let mut segments = Vec::new();
    let mut pending = Pending::default();
    let mut quote: Option<char> = None;

    for c in source.chars() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => pending.text.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    pending.quoted = true;
                }
                '.' => {
                    let done = std::mem::take(&mut pending);
                    segments.push(finish(source, done, segments.is_empty())?);
                }
                _ => pending.text.push(c),
            },
        }
    }

    if quote.is_some() {
        return Err(KeyError::UnterminatedQuote {
            key: source.to_string(),
        });
    }
    segments.push(finish(source, pending, segments.is_empty())?);
    Ok(segments)
}

fn finish(source: &str, pending: Pending, first: bool) -> Result<Segment, KeyError> {
    if pending.text.is_empty() {
        return Err(KeyError::EmptyKeySegment {
            key: source.to_string(),
        });
    }

    if !pending.quoted && pending.text.bytes().all(|b| b.is_ascii_digit()) {
        if first {
            return Err(KeyError::FirstSegmentIsIndex {
                key: source.to_string(),
            });
        }
        // Digit strings too large for an index stay names
        if let Ok(index) = pending.text.parse::<usize>() {
            return Ok(Segment::Index(index));
        }
    }

    Ok(Segment::Name(pending.text))
}
