use crate::error::{Error, Result};

/// The whitespace trimming applied by the field processor.
///
/// Outer trimming narrows a field before quotes are examined, so a quoted
/// field surrounded by whitespace is still recognized as quoted. Inner
/// trimming narrows the content between the quotes of a quoted field and
/// has no effect on unquoted fields.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Trim {
    /// Leave fields untouched. This is the default.
    #[default]
    None,
    /// Trim whitespace around a field, outside any quoting.
    Outer,
    /// Trim whitespace just inside the quotes of a quoted field.
    Inner,
    /// Trim both outside a field and inside its quotes.
    All,
}

impl Trim {
    pub(crate) fn outer(&self) -> bool {
        matches!(*self, Trim::Outer | Trim::All)
    }

    pub(crate) fn inner(&self) -> bool {
        matches!(*self, Trim::Inner | Trim::All)
    }
}

/// The configuration of a parser.
///
/// A configuration is immutable for the lifetime of the parser that was
/// built from it. It is plain data: two parsers may be built from one
/// configuration, and a bad data handler receives a reference to it as
/// part of its context.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) delimiter: Vec<u8>,
    pub(crate) quote: u8,
    pub(crate) escape: Option<u8>,
    pub(crate) comment: Option<u8>,
    pub(crate) ignore_blank_lines: bool,
    pub(crate) ignore_quotes: bool,
    pub(crate) line_break_in_quotes_is_bad_data: bool,
    pub(crate) trim: Trim,
    pub(crate) whitespace: Vec<u8>,
    pub(crate) buffer_capacity: usize,
    pub(crate) count_bytes: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            delimiter: vec![b','],
            quote: b'"',
            escape: None,
            comment: None,
            ignore_blank_lines: true,
            ignore_quotes: false,
            line_break_in_quotes_is_bad_data: false,
            trim: Trim::None,
            whitespace: vec![b' ', b'\t'],
            buffer_capacity: 8 * (1 << 10),
            count_bytes: false,
        }
    }
}

impl Config {
    /// The field delimiter, one or more bytes.
    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    /// The quotation byte.
    pub fn quote(&self) -> u8 {
        self.quote
    }

    /// The escape byte. Unless configured otherwise this is the quote
    /// itself, which gives doubled-quote escaping.
    pub fn escape(&self) -> u8 {
        self.escape.unwrap_or(self.quote)
    }

    /// The comment marker, if comment lines are skipped.
    pub fn comment(&self) -> Option<u8> {
        self.comment
    }

    /// Whether lines holding nothing but a terminator are skipped.
    pub fn ignore_blank_lines(&self) -> bool {
        self.ignore_blank_lines
    }

    /// Whether quote bytes are treated as ordinary field content.
    pub fn ignore_quotes(&self) -> bool {
        self.ignore_quotes
    }

    /// Whether a line terminator inside a quoted field is reported as bad
    /// data when the field is processed.
    pub fn line_break_in_quotes_is_bad_data(&self) -> bool {
        self.line_break_in_quotes_is_bad_data
    }

    /// The trimming applied by the field processor.
    pub fn trim(&self) -> Trim {
        self.trim
    }

    /// The set of bytes the field processor trims as whitespace.
    pub fn whitespace(&self) -> &[u8] {
        &self.whitespace
    }

    /// The initial capacity of the record buffer. The buffer grows on
    /// demand, so this bounds nothing; it only sizes the first allocation.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Whether the parser maintains a byte count alongside its character
    /// count.
    pub fn count_bytes(&self) -> bool {
        self.count_bytes
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.delimiter.is_empty() {
            return Err(Error::config("delimiter must not be empty"));
        }
        if self.delimiter == b"\r" || self.delimiter == b"\n" {
            return Err(Error::config(
                "delimiter must not be a line terminator",
            ));
        }
        if self.delimiter == [self.quote] {
            return Err(Error::config("delimiter must differ from quote"));
        }
        if let b'\r' | b'\n' | b'\0' = self.quote {
            return Err(Error::config(
                "quote must not be a line terminator or NUL",
            ));
        }
        let escape = self.escape();
        if let b'\r' | b'\n' = escape {
            return Err(Error::config(
                "escape must not be a line terminator",
            ));
        }
        if self.delimiter == [escape] {
            return Err(Error::config("delimiter must differ from escape"));
        }
        Ok(())
    }
}
