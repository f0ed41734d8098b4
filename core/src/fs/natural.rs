//! Human ordering of names with embedded numbers ("page2" before "page10").

use std::cmp::Ordering;
use std::path::Path;

/// A maximal run of digits or non-digits inside a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    /// Raw digits as they appear, leading zeros included.
    Number(&'a str),
}

/// Split `input` into alternating digit and non-digit runs.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (idx, ch) in input.char_indices() {
        let digit = ch.is_ascii_digit();
        match in_digits {
            Some(current) if current != digit => {
                tokens.push(make_token(&input[start..idx], current));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }

    if let Some(digit) = in_digits {
        tokens.push(make_token(&input[start..], digit));
    }
    tokens
}

fn make_token(run: &str, digit: bool) -> Token<'_> {
    if digit { Token::Number(run) } else { Token::Text(run) }
}

/// Comparison unit: a lowercased character or a whole digit run.
#[derive(Debug, Clone, Copy)]
enum Symbol<'a> {
    Char(char),
    Number(&'a str),
}

impl Ord for Symbol<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Symbol::Char(a), Symbol::Char(b)) => a.cmp(b),
            (Symbol::Number(a), Symbol::Number(b)) => cmp_digits(a, b),
            // A non-digit character is either below '0' or above '9'.
            (Symbol::Char(c), Symbol::Number(_)) => c.cmp(&'0'),
            (Symbol::Number(_), Symbol::Char(c)) => '0'.cmp(c),
        }
    }
}

impl PartialOrd for Symbol<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Symbol<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Symbol<'_> {}

fn symbols(input: &str) -> Vec<Symbol<'_>> {
    let mut out = Vec::with_capacity(input.len());
    for token in tokenize(input) {
        match token {
            Token::Number(digits) => out.push(Symbol::Number(digits)),
            Token::Text(text) => {
                out.extend(text.chars().flat_map(char::to_lowercase).map(Symbol::Char));
            }
        }
    }
    out
}

/// Natural comparison of two names.
///
/// Numeric runs compare by value, so `"0002"` equals `"2"` and sorts before `"10"`; text
/// compares case-insensitively by code point. When one name runs out first it sorts first.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    symbols(a).cmp(&symbols(b))
}

/// Natural comparison over the lossy string form of two paths.
pub fn natural_cmp_path(a: &Path, b: &Path) -> Ordering {
    natural_cmp(&a.to_string_lossy(), &b.to_string_lossy())
}

/// Sort names in place using [`natural_cmp`]. The sort is stable, so names that compare equal
/// keep their input order.
pub fn sort_naturally<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
