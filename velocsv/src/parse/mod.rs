//! Field-level parsing helpers shared by inference and the chunk drivers.

pub mod temporal;

use std::borrow::Cow;

/// Null-literal matcher built once per read.
///
/// The configured list is comma-separated; an empty token means the empty
/// string itself is null. Linear search beats hashing here: the list is
/// typically three to five short items.
#[derive(Clone, Debug)]
pub struct NullChecker {
    literals: Vec<Vec<u8>>,
    max_len: usize,
    empty_is_null: bool,
}

impl NullChecker {
    pub fn new(null_values: &str) -> Self {
        let mut literals: Vec<Vec<u8>> = Vec::new();
        let mut max_len = 0usize;
        let mut empty_is_null = false;
        for token in null_values.split(',') {
            if token.is_empty() {
                empty_is_null = true;
            } else {
                max_len = max_len.max(token.len());
                literals.push(token.as_bytes().to_vec());
            }
        }
        Self {
            literals,
            max_len,
            empty_is_null,
        }
    }

    #[inline]
    pub fn is_null(&self, value: &[u8]) -> bool {
        if value.is_empty() {
            return self.empty_is_null;
        }
        if value.len() > self.max_len {
            return false;
        }
        self.literals.iter().any(|nv| nv == value)
    }
}

/// Word lists for boolean parsing, from the configured options.
#[derive(Clone, Debug)]
pub struct BoolWords {
    truthy: Vec<Vec<u8>>,
    falsy: Vec<Vec<u8>>,
}

impl BoolWords {
    pub fn new(true_values: &str, false_values: &str) -> Self {
        let split = |s: &str| {
            s.split(',')
                .filter(|t| !t.is_empty())
                .map(|t| t.as_bytes().to_vec())
                .collect()
        };
        Self {
            truthy: split(true_values),
            falsy: split(false_values),
        }
    }

    #[inline]
    pub fn is_true(&self, value: &[u8]) -> bool {
        self.truthy.iter().any(|w| w == value)
    }

    #[inline]
    pub fn is_false(&self, value: &[u8]) -> bool {
        self.falsy.iter().any(|w| w == value)
    }
}

/// Everything the hot append path needs from the options, resolved once.
#[derive(Clone, Debug)]
pub struct ParseConfig {
    pub nulls: NullChecker,
    pub bools: BoolWords,
}

impl ParseConfig {
    pub fn from_options(opts: &crate::options::CsvOptions) -> Self {
        Self {
            nulls: NullChecker::new(&opts.null_values),
            bools: BoolWords::new(&opts.true_values, &opts.false_values),
        }
    }
}

/// Collapse doubled quotes (`""` -> `"`). Borrows when the field contains no
/// quote at all. A lone inner quote is passed through and flagged via
/// `invalid` when provided.
pub fn unescape_quotes<'a>(
    value: &'a [u8],
    quote: u8,
    mut invalid: Option<&mut bool>,
) -> Cow<'a, [u8]> {
    if memchr::memchr(quote, value).is_none() {
        return Cow::Borrowed(value);
    }

    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        if value[i] == quote && i + 1 < value.len() && value[i + 1] == quote {
            out.push(quote);
            i += 2;
        } else {
            if value[i] == quote {
                if let Some(flag) = invalid.as_mut() {
                    **flag = true;
                }
            }
            out.push(value[i]);
            i += 1;
        }
    }
    Cow::Owned(out)
}

/// Strip each backslash and keep the following byte literally. Reserved for
/// backslash-style escape dialects.
pub fn unescape_backslash(value: &[u8]) -> Cow<'_, [u8]> {
    if memchr::memchr(b'\\', value).is_none() {
        return Cow::Borrowed(value);
    }
    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        if value[i] == b'\\' && i + 1 < value.len() {
            i += 1;
        }
        out.push(value[i]);
        i += 1;
    }
    Cow::Owned(out)
}
