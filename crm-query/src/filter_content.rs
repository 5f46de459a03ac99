//! Splitting of REST filter expressions into top-level clauses.

use crate::error::{QueryBuilderError, QueryBuilderResult};

/// Splits `input` on commas that sit outside parentheses, brackets and
/// quoted values.
///
/// A quote opens a quoted value only at the start of a value (after `:`,
/// `,` or `[`, or at the very start), so apostrophes inside bare words are
/// literal. Inside a quoted value a doubled quote does not close it.
pub(crate) fn split_top_level(input: &str) -> Result<Vec<&str>, &'static str> {
    let mut parts = Vec::new();
    let mut parens = 0usize;
    let mut brackets = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut previous: Option<char> = None;
    let mut chars = input.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if let Some(open) = quote {
            if c == open && chars.next_if(|&(_, next)| next == open).is_none() {
                quote = None;
            }
            previous = Some(c);
            continue;
        }
        match c {
            '"' | '\'' if matches!(previous, None | Some(':') | Some(',') | Some('[')) => {
                quote = Some(c);
            }
            '(' => parens += 1,
            ')' => parens = parens.checked_sub(1).ok_or("has an unexpected ')'")?,
            '[' => brackets += 1,
            ']' => brackets = brackets.checked_sub(1).ok_or("has an unexpected ']'")?,
            ',' if parens == 0 && brackets == 0 => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
        previous = Some(c);
    }

    if quote.is_some() {
        return Err("has an unterminated quoted value");
    }
    if parens > 0 {
        return Err("has unbalanced parentheses");
    }
    if brackets > 0 {
        return Err("has unbalanced brackets");
    }
    parts.push(&input[start..]);
    Ok(parts)
}

/// Returns the top-level clauses of a conjunction expression.
///
/// The conjunction name and its outer parentheses are stripped; nested
/// composite clauses are returned unsplit for the caller to recurse into.
///
/// ```
/// use crm_query::parse_filter_content;
///
/// let parts = parse_filter_content("and(a[eq]:1,or(b[eq]:2,c[eq]:3))").unwrap();
/// assert_eq!(parts, vec!["a[eq]:1", "or(b[eq]:2,c[eq]:3)"]);
/// ```
pub fn parse_filter_content(expression: &str) -> QueryBuilderResult<Vec<String>> {
    let trimmed = expression.trim();
    let open = trimmed
        .find('(')
        .ok_or_else(|| QueryBuilderError::unparsable(expression, "is missing '('"))?;
    if !trimmed.ends_with(')') {
        return Err(QueryBuilderError::unparsable(
            expression,
            "must end with ')'",
        ));
    }
    let inner = &trimmed[open + 1..trimmed.len() - 1];
    let parts =
        split_top_level(inner).map_err(|reason| QueryBuilderError::unparsable(expression, reason))?;
    Ok(parts.into_iter().map(str::to_string).collect())
}
