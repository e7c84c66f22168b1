use std::fmt;

/// Wraps a closure as a `Display` implementation.
pub fn display_fn<F>(f: F) -> impl fmt::Display
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    struct DisplayFn<F>(F);
    impl<F> fmt::Display for DisplayFn<F>
    where
        F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
    {
        fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            (self.0)(formatter)
        }
    }
    DisplayFn(f)
}

/// Strips the quotes from a single-quoted character or a double-quoted
/// string and processes backslash escapes.
///
/// Recognised escapes: `\n`, `\r`, `\t`, `\\`, `\"`, `\'`, `\x{NN}` and
/// `\u{NNNN}`. An unknown escape stands for the escaped character itself;
/// unquoted input is returned unchanged apart from escape processing.
pub fn dequote_string(text: &str) -> String {
    let inner = match (text.chars().next(), text.chars().last()) {
        (Some('"'), Some('"')) | (Some('\''), Some('\'')) if text.len() >= 2 => {
            &text[1..text.len() - 1]
        }
        _ => text,
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('x') | Some('u') => match braced_code_point(&mut chars) {
                Some(ch) => out.push(ch),
                None => out.push('\u{fffd}'),
            },
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

/// Reads a `{NN...}` hexadecimal code point following `\x` or `\u`.
fn braced_code_point(chars: &mut std::str::Chars<'_>) -> Option<char> {
    let mut iter = chars.clone();
    if iter.next() != Some('{') {
        return None;
    }
    let mut value: u32 = 0;
    loop {
        match iter.next()? {
            '}' => break,
            digit => value = value.checked_mul(16)?.checked_add(digit.to_digit(16)?)?,
        }
    }
    *chars = iter;
    char::from_u32(value)
}
