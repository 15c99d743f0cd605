use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::result;

use memchr::memchr2;

use crate::buffer::Buffer;
use crate::config::{Config, Trim};
use crate::error::{BadData, BadDataHandler, BoxError, Result};
use crate::field::{self, Sink};
use crate::position::{Encoding, Position, SingleByte};
use crate::record::{FieldIndex, FieldSpan, Record};

/// Builds a parser with various configuration knobs.
///
/// Once a parser is built its configuration cannot be changed. The
/// builder is consumed by `from_reader`/`from_path` so that it can hand
/// its bad data handler to the parser.
///
/// # Example
///
/// ```
/// use delimit::ParserBuilder;
///
/// # fn example() -> delimit::Result<()> {
/// let data = "city;country;pop\nBoston;United States;4628910\n";
/// let mut parser = ParserBuilder::new()
///     .delimiter(b";")
///     .from_reader(data.as_bytes())?;
///
/// assert!(parser.read()?);
/// assert_eq!(parser.record()?, vec!["city", "country", "pop"]);
/// # Ok(()) }
/// # example().unwrap();
/// ```
pub struct ParserBuilder {
    config: Config,
    encoding: Option<Box<dyn Encoding>>,
    handler: Option<BadDataHandler>,
    strict: bool,
}

impl Default for ParserBuilder {
    fn default() -> ParserBuilder {
        ParserBuilder {
            config: Config::default(),
            encoding: None,
            handler: None,
            strict: false,
        }
    }
}

impl ParserBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> ParserBuilder {
        ParserBuilder::default()
    }

    /// The field delimiter, one or more bytes.
    ///
    /// The default is `b","`. A delimiter may be several bytes long
    /// (`b"!#"`); a false start on its first byte costs at most one
    /// re-examined byte and never mis-attributes data to the wrong field.
    pub fn delimiter(mut self, delimiter: &[u8]) -> ParserBuilder {
        self.config.delimiter = delimiter.to_vec();
        self
    }

    /// The quotation byte. The default is `b'"'`.
    pub fn quote(mut self, quote: u8) -> ParserBuilder {
        self.config.quote = quote;
        self
    }

    /// The escape byte recognized inside quoted fields.
    ///
    /// The default is the quote itself, which makes a doubled quote
    /// stand for one literal quote. Setting a distinct byte (commonly
    /// `b'\\'`) switches to backslash-style escaping.
    pub fn escape(mut self, escape: u8) -> ParserBuilder {
        self.config.escape = Some(escape);
        self
    }

    /// The comment marker.
    ///
    /// When set, a record whose first byte is the marker is skipped up to
    /// and including its line terminator. Disabled by default.
    pub fn comment(mut self, comment: Option<u8>) -> ParserBuilder {
        self.config.comment = comment;
        self
    }

    /// Whether lines holding nothing but a terminator are skipped.
    ///
    /// Enabled by default. When disabled, a blank line parses as a record
    /// with one empty field.
    pub fn ignore_blank_lines(mut self, yes: bool) -> ParserBuilder {
        self.config.ignore_blank_lines = yes;
        self
    }

    /// Treat quote bytes as ordinary content.
    ///
    /// When enabled no field is ever considered quoted: delimiters and
    /// line terminators always take effect, and quote counts stay zero.
    pub fn ignore_quotes(mut self, yes: bool) -> ParserBuilder {
        self.config.ignore_quotes = yes;
        self
    }

    /// Report a line terminator inside a quoted field as bad data.
    ///
    /// The report fires from the field processor, not from the tokenizer,
    /// when the field is processed.
    pub fn line_break_in_quotes_is_bad_data(
        mut self,
        yes: bool,
    ) -> ParserBuilder {
        self.config.line_break_in_quotes_is_bad_data = yes;
        self
    }

    /// The whitespace trimming applied by the field processor.
    pub fn trim(mut self, trim: Trim) -> ParserBuilder {
        self.config.trim = trim;
        self
    }

    /// The set of bytes trimmed as whitespace. The default is space and
    /// tab.
    pub fn whitespace(mut self, whitespace: &[u8]) -> ParserBuilder {
        self.config.whitespace = whitespace.to_vec();
        self
    }

    /// Set the initial capacity (in bytes) of the record buffer.
    ///
    /// The buffer grows on demand to hold the longest record, so this is
    /// purely a sizing hint; any capacity down to a single byte parses
    /// identically.
    pub fn buffer_capacity(mut self, capacity: usize) -> ParserBuilder {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Maintain a byte count alongside the character count.
    ///
    /// Counting uses the `SingleByte` encoding unless `encoding` names
    /// another one.
    pub fn count_bytes(mut self, yes: bool) -> ParserBuilder {
        self.config.count_bytes = yes;
        self
    }

    /// Maintain a byte count under the given encoding.
    ///
    /// Implies `count_bytes(true)`.
    pub fn encoding<E: Encoding + 'static>(
        mut self,
        encoding: E,
    ) -> ParserBuilder {
        self.config.count_bytes = true;
        self.encoding = Some(Box::new(encoding));
        self
    }

    /// Install a handler invoked when the field processor finds malformed
    /// quoting.
    ///
    /// The handler may return an error to abort the call that was
    /// processing the field. Without a handler, malformed fields produce
    /// best-effort values silently unless `error_on_bad_data` is set.
    pub fn on_bad_data<F>(mut self, handler: F) -> ParserBuilder
    where
        F: FnMut(&BadData) -> result::Result<(), BoxError> + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Without a handler installed, treat malformed quoting as an error
    /// instead of producing a best-effort value.
    pub fn error_on_bad_data(mut self, yes: bool) -> ParserBuilder {
        self.strict = yes;
        self
    }

    /// Build a parser from this configuration that reads from `rdr`.
    ///
    /// The configuration is validated here; an invalid combination of
    /// delimiter, quote and escape is reported before anything is read.
    pub fn from_reader<R: io::Read>(self, rdr: R) -> Result<Parser<R>> {
        self.config.validate()?;
        let ParserBuilder { config, encoding, handler, strict } = self;
        let encoding = if config.count_bytes {
            Some(encoding.unwrap_or_else(|| Box::new(SingleByte)))
        } else {
            None
        };
        Ok(Parser {
            rdr,
            buf: Buffer::with_capacity(config.buffer_capacity),
            fields: FieldIndex::new(),
            scratch: Vec::new(),
            encoding,
            handler,
            strict,
            config,
            row_start: 0,
            pos: Position::new(),
            last_was_cr: false,
            done: false,
        })
    }

    /// Build a parser from this configuration that reads from the file at
    /// the given path.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<Parser<File>> {
        let file = File::open(path)?;
        self.from_reader(file)
    }
}

impl fmt::Debug for ParserBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ParserBuilder")
            .field("config", &self.config)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

/// A streaming parser for delimited text, pulled one record at a time.
///
/// The parser owns a contiguous buffer that always holds at least the
/// current record, so raw fields and the raw record are handed out as
/// zero-copy slices valid until the next `read`. Processed fields are
/// produced lazily per field; only escape unfolding copies, into a
/// scratch buffer reused across fields.
///
/// The tokenizer makes a single pass, spending amortized constant time
/// per byte for any source chunking and any buffer capacity down to one
/// byte. It never fails on malformed data: stray or unclosed quotes are
/// latched into the field's quote count and reported through the bad
/// data sink when the field is processed.
///
/// # Example
///
/// ```
/// use delimit::Parser;
///
/// # fn example() -> delimit::Result<()> {
/// let data = "\
/// Boston,United States,4628910
/// Concord,United States,42695
/// ";
/// let mut parser = Parser::from_reader(data.as_bytes())?;
/// while parser.read()? {
///     let record = parser.record()?;
///     println!("{:?}", record);
/// }
/// assert_eq!(parser.row(), 2);
/// # Ok(()) }
/// # example().unwrap();
/// ```
pub struct Parser<R> {
    /// The character source.
    rdr: R,
    buf: Buffer,
    fields: FieldIndex,
    /// Scratch space for escape unfolding, reused across fields.
    scratch: Vec<u8>,
    config: Config,
    encoding: Option<Box<dyn Encoding>>,
    handler: Option<BadDataHandler>,
    strict: bool,
    /// Offset of the current record's first byte in the buffer. Rebased
    /// whenever a refill compacts the buffer.
    row_start: usize,
    pos: Position,
    /// Whether the previously consumed byte was a CR, so that the LF of
    /// a CRLF pair is not counted as a second raw row.
    last_was_cr: bool,
    /// Whether the source reported end of stream.
    done: bool,
}

impl<R: io::Read> Parser<R> {
    /// Create a parser with the default configuration for the given
    /// reader.
    ///
    /// To customize parsing, use a `ParserBuilder`.
    pub fn from_reader(rdr: R) -> Result<Parser<R>> {
        ParserBuilder::new().from_reader(rdr)
    }

    /// Advance to the next record.
    ///
    /// Returns `Ok(true)` when a record was produced and `Ok(false)` once
    /// the stream is exhausted. Skipped blank lines and comment lines
    /// never produce a record. A stream ending in the middle of a record
    /// still produces that final record.
    ///
    /// Everything handed out by `field`, `field_raw` and `raw_record`
    /// refers to the record produced by the most recent call.
    pub fn read(&mut self) -> Result<bool> {
        self.fields.clear();
        self.row_start = self.buf.pos();
        loop {
            let first = match self.next_unit()? {
                Some(unit) => unit,
                None => return Ok(false),
            };
            if self.config.comment == Some(first) {
                self.skip_line()?;
                self.row_start = self.buf.pos();
                continue;
            }
            if self.config.ignore_blank_lines
                && (first == b'\r' || first == b'\n')
            {
                if first == b'\r' && self.peek_unit()? == Some(b'\n') {
                    self.next_unit()?;
                }
                self.row_start = self.buf.pos();
                continue;
            }
            self.read_fields(first)?;
            self.pos.rows += 1;
            return Ok(true);
        }
    }

    /// Tokenize one record whose first byte is `first`.
    ///
    /// All offsets are kept relative to `row_start` so that buffer
    /// compaction mid-record cannot invalidate them.
    fn read_fields(&mut self, first: u8) -> Result<()> {
        let quote = self.config.quote;
        let escape = self.config.escape();
        let delim0 = self.config.delimiter[0];
        let delim_len = self.config.delimiter.len();
        let mut field_start = 0;
        let mut quotes = 0u32;
        let mut in_quotes = false;
        let mut unit = first;

        'record: loop {
            if in_quotes {
                if unit == quote {
                    quotes += 1;
                    if escape == quote && self.peek_unit()? == Some(quote) {
                        self.next_unit()?;
                        quotes += 1;
                    } else {
                        in_quotes = false;
                    }
                } else if unit == escape {
                    match self.next_unit()? {
                        Some(next) => {
                            if next == quote {
                                quotes += 1;
                            }
                        }
                        None => break 'record,
                    }
                }
                // Delimiters and line terminators are content here.
            } else if unit == b'\r' || unit == b'\n' {
                // A terminator outside quotes always ends the record,
                // even when the delimiter happens to begin with CR or LF.
                let end = self.rel_pos() - 1;
                self.fields.add(field_start, end - field_start, quotes);
                if unit == b'\r' && self.peek_unit()? == Some(b'\n') {
                    self.next_unit()?;
                }
                return Ok(());
            } else if unit == quote
                && !self.config.ignore_quotes
                && self.rel_pos() - 1 == field_start
            {
                // A quote on the first byte of a field opens quoting
                // before any delimiter candidate is considered, so a
                // delimiter beginning with the quote byte cannot swallow
                // the opening quote.
                quotes += 1;
                in_quotes = true;
            } else if unit == delim0 {
                let mark = self.rel_pos() - 1;
                let mut matched = 1;
                let mismatch = loop {
                    if matched == delim_len {
                        break None;
                    }
                    match self.next_unit()? {
                        None => break 'record,
                        Some(next) => {
                            if next == self.config.delimiter[matched] {
                                matched += 1;
                            } else {
                                break Some(next);
                            }
                        }
                    }
                };
                match mismatch {
                    None => {
                        self.fields.add(field_start, mark - field_start, quotes);
                        field_start = self.rel_pos();
                        quotes = 0;
                    }
                    Some(next) => {
                        // The matched prefix stays field content; the
                        // mismatching byte is re-examined, and may itself
                        // start a new candidate.
                        unit = next;
                        continue 'record;
                    }
                }
            } else if unit == quote && !self.config.ignore_quotes {
                // A quote later in an unquoted field is content; the
                // count marks the field for the processor.
                quotes += 1;
            }
            unit = match self.next_unit()? {
                Some(next) => next,
                None => break 'record,
            };
        }
        // End of stream in the middle of a record: the trailing field
        // runs to the last byte read.
        self.fields.add(field_start, self.rel_pos() - field_start, quotes);
        Ok(())
    }

    /// Discard everything up to and including the next line terminator.
    fn skip_line(&mut self) -> Result<()> {
        loop {
            let n = match memchr2(b'\r', b'\n', self.buf.unread()) {
                Some(i) => i,
                None => self.buf.unread().len(),
            };
            self.bulk_consume(n);
            if self.buf.has_unread() {
                if let Some(unit) = self.next_unit()? {
                    if unit == b'\r' && self.peek_unit()? == Some(b'\n') {
                        self.next_unit()?;
                    }
                }
                return Ok(());
            }
            if !self.fill_buf()? {
                return Ok(());
            }
        }
    }

    /// Consume `n` buffered bytes known to contain no line terminators.
    fn bulk_consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(ref encoding) = self.encoding {
            let mut total = 0;
            for &unit in &self.buf.unread()[..n] {
                total += encoding.byte_len(unit);
            }
            self.pos.bytes += total;
        }
        self.pos.chars += n as u64;
        self.last_was_cr = false;
        self.buf.advance_by(n);
    }

    #[inline]
    fn rel_pos(&self) -> usize {
        self.buf.pos() - self.row_start
    }

    /// Consume one code unit, updating every counter.
    #[inline]
    fn next_unit(&mut self) -> Result<Option<u8>> {
        if !self.fill_buf()? {
            return Ok(None);
        }
        let unit = self.buf.advance();
        self.pos.chars += 1;
        if let Some(ref encoding) = self.encoding {
            self.pos.bytes += encoding.byte_len(unit);
        }
        if unit == b'\r' {
            self.pos.raw_rows += 1;
            self.last_was_cr = true;
        } else {
            if unit == b'\n' && !self.last_was_cr {
                self.pos.raw_rows += 1;
            }
            self.last_was_cr = false;
        }
        Ok(Some(unit))
    }

    /// Look at the next code unit without consuming it.
    #[inline]
    fn peek_unit(&mut self) -> Result<Option<u8>> {
        if !self.fill_buf()? {
            return Ok(None);
        }
        Ok(Some(self.buf.peek()))
    }

    /// Make at least one unread byte available, refilling (and possibly
    /// compacting or growing) the buffer if necessary.
    #[inline]
    fn fill_buf(&mut self) -> Result<bool> {
        if self.buf.has_unread() {
            return Ok(true);
        }
        if self.done {
            return Ok(false);
        }
        let refill = self.buf.refill(&mut self.rdr, self.row_start)?;
        self.row_start -= refill.shift;
        if refill.eof {
            self.done = true;
            return Ok(false);
        }
        Ok(true)
    }

    /// The number of fields in the current record.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// The processed value of field `i`, or `None` if the current record
    /// has no such field.
    ///
    /// Processing runs the trim/unquote/unfold pipeline lazily over the
    /// raw bytes; the returned slice is valid until the next `read` and
    /// points into the parser's buffer unless escape unfolding had to
    /// copy. Malformed quoting is reported to the bad data sink here,
    /// once per field.
    pub fn field(&mut self, i: usize) -> Result<Option<&[u8]>> {
        let span = match self.fields.get(i) {
            Some(span) => *span,
            None => return Ok(None),
        };
        let start = self.row_start + span.start;
        let mut sink = Sink {
            handler: &mut self.handler,
            strict: self.strict,
            record: self.buf.slice(self.row_start, self.buf.pos()),
            row: self.pos.rows,
            raw_row: self.pos.raw_rows,
            config: &self.config,
            fired: false,
        };
        let processed = field::process(
            self.buf.slice(start, start + span.len),
            span.quotes,
            &self.config,
            &mut self.scratch,
            &mut sink,
        )?;
        Ok(Some(processed))
    }

    /// The raw bytes of field `i`, exactly as they appear in the source,
    /// or `None` if the current record has no such field.
    ///
    /// The slice points into the parser's buffer and is valid until the
    /// next `read`.
    pub fn field_raw(&self, i: usize) -> Option<&[u8]> {
        self.fields.get(i).map(|span| {
            let start = self.row_start + span.start;
            self.buf.slice(start, start + span.len)
        })
    }

    /// The span of field `i`: its position within the record and the
    /// number of quote bytes the tokenizer saw in it.
    pub fn field_span(&self, i: usize) -> Option<FieldSpan> {
        self.fields.get(i).copied()
    }

    /// Process every field of the current record into an owned `Record`.
    pub fn record(&mut self) -> Result<Record> {
        let mut record = Record::new();
        self.fill_record(&mut record)?;
        Ok(record)
    }

    /// Read the next record and process its fields into `record`,
    /// reusing its allocations.
    ///
    /// Returns `Ok(false)` and clears `record` once the stream is
    /// exhausted.
    pub fn read_into(&mut self, record: &mut Record) -> Result<bool> {
        if !self.read()? {
            record.clear();
            return Ok(false);
        }
        self.fill_record(record)?;
        Ok(true)
    }

    fn fill_record(&mut self, record: &mut Record) -> Result<()> {
        record.clear();
        for i in 0..self.fields.len() {
            if let Some(f) = self.field(i)? {
                record.push_field(f);
            }
        }
        Ok(())
    }

    /// The raw bytes of the current record, including its line
    /// terminator when one was present in the source.
    ///
    /// The slice is valid until the next `read`; concatenating the raw
    /// record of every read reproduces the source byte for byte when no
    /// lines are skipped.
    pub fn raw_record(&self) -> &[u8] {
        self.buf.slice(self.row_start, self.buf.pos())
    }

    /// Returns a borrowed iterator over all remaining records.
    pub fn records(&mut self) -> Records<R> {
        Records { parser: self }
    }

    /// Returns an owned iterator over all remaining records.
    pub fn into_records(self) -> IntoRecords<R> {
        IntoRecords { parser: self }
    }

    /// A snapshot of the stream counters.
    pub fn position(&self) -> &Position {
        &self.pos
    }

    /// The number of records delivered so far.
    pub fn row(&self) -> u64 {
        self.pos.rows
    }

    /// The number of source line terminators consumed so far, including
    /// terminators inside quoted fields and on skipped lines.
    pub fn raw_row(&self) -> u64 {
        self.pos.raw_rows
    }

    /// The total number of code units consumed from the source.
    pub fn char_count(&self) -> u64 {
        self.pos.chars
    }

    /// The total number of encoded bytes consumed, when byte counting is
    /// enabled; zero otherwise.
    pub fn byte_count(&self) -> u64 {
        self.pos.bytes
    }

    /// The configuration this parser was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true if and only if the source has reported end of
    /// stream.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Unwrap this parser, returning the underlying character source
    /// without closing it.
    pub fn into_inner(self) -> R {
        self.rdr
    }
}

impl Parser<File> {
    /// Create a parser with the default configuration for the file at
    /// the given path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Parser<File>> {
        ParserBuilder::new().from_path(path)
    }
}

impl<R> fmt::Debug for Parser<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Parser")
            .field("config", &self.config)
            .field("position", &self.pos)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// A borrowed iterator over records.
///
/// The lifetime parameter refers to the parser it borrows.
pub struct Records<'p, R> {
    parser: &'p mut Parser<R>,
}

impl<'p, R: io::Read> Records<'p, R> {
    /// Return a mutable reference to the underlying parser.
    pub fn parser(&mut self) -> &mut Parser<R> {
        self.parser
    }
}

impl<'p, R: io::Read> Iterator for Records<'p, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        match self.parser.read() {
            Err(err) => Some(Err(err)),
            Ok(false) => None,
            Ok(true) => Some(self.parser.record()),
        }
    }
}

/// An owned iterator over records.
pub struct IntoRecords<R> {
    parser: Parser<R>,
}

impl<R: io::Read> IntoRecords<R> {
    /// Return a mutable reference to the underlying parser.
    pub fn parser(&mut self) -> &mut Parser<R> {
        &mut self.parser
    }
}

impl<R: io::Read> Iterator for IntoRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        match self.parser.read() {
            Err(err) => Some(Err(err)),
            Ok(false) => None,
            Ok(true) => Some(self.parser.record()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    use crate::config::Trim;
    use crate::error::ErrorKind;
    use crate::position::FixedWidth;
    use crate::record::Record;

    use super::{Parser, ParserBuilder};

    macro_rules! rows {
        ($([$($field:expr),*]),* $(,)?) => {{
            let rows: Vec<Vec<&str>> = vec![$(vec![$($field),*]),*];
            rows
        }};
    }

    macro_rules! parses_to {
        ($name:ident, $data:expr, $expected:expr) => {
            parses_to!($name, $data, $expected, |b: ParserBuilder| b);
        };
        ($name:ident, $data:expr, $expected:expr, $config:expr) => {
            #[test]
            fn $name() {
                // Every capacity must tokenize identically, including a
                // one-byte buffer that refills on every unit.
                for capacity in [1, 2, 3, 5, 8, 4096] {
                    let configure = $config;
                    let builder = configure(
                        ParserBuilder::new().buffer_capacity(capacity),
                    );
                    let mut parser =
                        builder.from_reader($data.as_bytes()).unwrap();
                    let mut got: Vec<Vec<String>> = vec![];
                    while parser.read().unwrap() {
                        let mut row = vec![];
                        for i in 0..parser.field_count() {
                            let field = parser.field(i).unwrap().unwrap();
                            row.push(
                                String::from_utf8(field.to_vec()).unwrap(),
                            );
                        }
                        got.push(row);
                    }
                    let expected: Vec<Vec<String>> = $expected
                        .iter()
                        .map(|row: &Vec<&str>| {
                            row.iter().map(|f| f.to_string()).collect()
                        })
                        .collect();
                    assert_eq!(expected, got, "capacity {}", capacity);
                }
            }
        };
    }

    parses_to!(one_row_one_field, "a", rows![["a"]]);
    parses_to!(one_row_many_fields, "a,b,c", rows![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma, "a,b,", rows![["a", "b", ""]]);
    parses_to!(one_row_one_field_lf, "a\n", rows![["a"]]);
    parses_to!(one_row_many_fields_lf, "a,b,c\n", rows![["a", "b", "c"]]);
    parses_to!(one_row_one_field_crlf, "a\r\n", rows![["a"]]);
    parses_to!(one_row_many_fields_crlf, "a,b,c\r\n", rows![["a", "b", "c"]]);
    parses_to!(one_row_one_field_cr, "a\r", rows![["a"]]);
    parses_to!(one_row_trailing_comma_cr, "a,b,\r", rows![["a", "b", ""]]);

    parses_to!(many_rows_one_field, "a\nb", rows![["a"], ["b"]]);
    parses_to!(
        many_rows_many_fields,
        "a,b,c\nx,y,z",
        rows![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        many_rows_trailing_comma,
        "a,b,\nx,y,",
        rows![["a", "b", ""], ["x", "y", ""]]
    );
    parses_to!(many_rows_one_field_cr, "a\rb\r", rows![["a"], ["b"]]);
    parses_to!(
        many_rows_many_fields_crlf,
        "a,b,c\r\nx,y,z\r\n",
        rows![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        mixed_line_endings,
        "a\rb\nc\r\nd",
        rows![["a"], ["b"], ["c"], ["d"]]
    );

    parses_to!(empty, "", rows![]);
    parses_to!(empty_lines, "\n\n\n\n", rows![]);
    parses_to!(empty_lines_crlf, "\r\n\r\n\r\n\r\n", rows![]);
    parses_to!(empty_lines_mixed, "\r\n\n\r\n\n", rows![]);
    parses_to!(
        empty_lines_interspersed,
        "\n\na,b\n\n\nx,y\n\n\nm,n\n",
        rows![["a", "b"], ["x", "y"], ["m", "n"]]
    );
    parses_to!(
        blank_lines_kept_when_not_ignored,
        "\na\n\n",
        rows![[""], ["a"], [""]],
        |b: ParserBuilder| b.ignore_blank_lines(false)
    );
    parses_to!(
        blank_crlf_is_one_empty_field,
        "\r\n",
        rows![[""]],
        |b: ParserBuilder| b.ignore_blank_lines(false)
    );
    parses_to!(all_empty_record, ",", rows![["", ""]]);

    parses_to!(
        comment_lines_skipped,
        "#skip me\na,b\n#and me\nc,d\n",
        rows![["a", "b"], ["c", "d"]],
        |b: ParserBuilder| b.comment(Some(b'#'))
    );
    parses_to!(
        comment_marker_mid_field_is_content,
        "a#b,c\n",
        rows![["a#b", "c"]],
        |b: ParserBuilder| b.comment(Some(b'#'))
    );
    parses_to!(
        comment_disabled_is_content,
        "#a,b\n",
        rows![["#a", "b"]]
    );
    parses_to!(
        comment_at_eos_without_terminator,
        "a\n#trailing",
        rows![["a"]],
        |b: ParserBuilder| b.comment(Some(b'#'))
    );

    parses_to!(
        quoted_row,
        "\"one\",\"two\",\"three\"\r\n",
        rows![["one", "two", "three"]]
    );
    parses_to!(quote_empty, "\"\"", rows![[""]]);
    parses_to!(quote_lf, "\"\"\n", rows![[""]]);
    parses_to!(quote_space, "\" \"", rows![[" "]]);
    parses_to!(quote_inner_space, "\" a \"", rows![[" a "]]);
    parses_to!(quote_outer_space, "  \"a\"  ", rows![["  \"a\"  "]]);
    parses_to!(
        quote_embedded_delimiter,
        "\"a,b\",c\n",
        rows![["a,b", "c"]]
    );
    parses_to!(
        quote_embedded_crlf,
        "\"a\r\nb\",c\r\n",
        rows![["a\r\nb", "c"]]
    );
    parses_to!(
        quote_doubled,
        "1,\"two \"\" 2\",3\r\n",
        rows![["1", "two \" 2", "3"]]
    );
    parses_to!(quote_change, "zaz", rows![["a"]], |b: ParserBuilder| {
        b.quote(b'z')
    });
    parses_to!(
        quote_distinct_escape,
        r#""a\"b",c"#,
        rows![["a\"b", "c"]],
        |b: ParserBuilder| b.escape(b'\\')
    );
    parses_to!(
        quote_unclosed_runs_to_eos,
        "a,b,\"c\r\nd,e,f\r\n",
        rows![["a", "b", "c\r\nd,e,f\r\n"]]
    );
    parses_to!(lone_quote_is_empty_field, "\"", rows![[""]]);
    parses_to!(
        quote_then_garbage,
        "\"ab\"cd,x\n",
        rows![["ab\"cd", "x"]]
    );
    parses_to!(
        ignore_quotes_mode,
        "\"a,b\"\n",
        rows![["\"a", "b\""]],
        |b: ParserBuilder| b.ignore_quotes(true)
    );

    parses_to!(delimiter_tabs, "a\tb", rows![["a", "b"]], |b: ParserBuilder| {
        b.delimiter(b"\t")
    });
    parses_to!(
        delimiter_multi_absent,
        "1,2\r\n",
        rows![["1,2"]],
        |b: ParserBuilder| b.delimiter(b"!#")
    );
    parses_to!(
        delimiter_multi,
        "1!#2\r\n",
        rows![["1", "2"]],
        |b: ParserBuilder| b.delimiter(b"!#")
    );
    parses_to!(
        delimiter_multi_false_start,
        "1!!#2\r\n",
        rows![["1!", "2"]],
        |b: ParserBuilder| b.delimiter(b"!#")
    );
    parses_to!(
        delimiter_multi_truncated_at_eos,
        "1!",
        rows![["1!"]],
        |b: ParserBuilder| b.delimiter(b"!#")
    );
    parses_to!(
        delimiter_multi_false_start_before_terminator,
        "1!\r\n2!#3\n",
        rows![["1!"], ["2", "3"]],
        |b: ParserBuilder| b.delimiter(b"!#")
    );
    parses_to!(
        delimiter_repeated_prefix,
        "1aab2\n",
        rows![["1a", "2"]],
        |b: ParserBuilder| b.delimiter(b"ab")
    );
    parses_to!(
        delimiter_three_bytes,
        "a<=>b<=>c\n",
        rows![["a", "b", "c"]],
        |b: ParserBuilder| b.delimiter(b"<=>")
    );
    parses_to!(
        delimiter_inside_quotes_is_content,
        "\"1!#2\"!#3\n",
        rows![["1!#2", "3"]],
        |b: ParserBuilder| b.delimiter(b"!#")
    );
    parses_to!(
        delimiter_sharing_quote_byte_keeps_quoted_fields,
        "\"ab\"\n",
        rows![["ab"]],
        |b: ParserBuilder| b.delimiter(b"\"#")
    );
    parses_to!(
        delimiter_sharing_quote_byte_matches_mid_field,
        "a\"#b\n",
        rows![["a", "b"]],
        |b: ParserBuilder| b.delimiter(b"\"#")
    );
    parses_to!(
        terminator_beats_delimiter_starting_with_cr,
        "a\r#b\n",
        rows![["a"], ["#b"]],
        |b: ParserBuilder| b.delimiter(b"\r#")
    );
    parses_to!(
        terminator_beats_delimiter_starting_with_lf,
        "a\n#b\r\n",
        rows![["a"], ["#b"]],
        |b: ParserBuilder| b.delimiter(b"\n#")
    );

    parses_to!(
        trim_outer,
        " a , \"b\" \n",
        rows![["a", "b"]],
        |b: ParserBuilder| b.trim(Trim::Outer)
    );
    parses_to!(
        trim_all,
        "\" a \", \" b \"\n",
        rows![["a", "b"]],
        |b: ParserBuilder| b.trim(Trim::All)
    );
    parses_to!(
        trim_inner_leaves_unquoted_alone,
        " a ,\" b \"\n",
        rows![[" a ", "b"]],
        |b: ParserBuilder| b.trim(Trim::Inner)
    );

    parses_to!(
        long_field_across_refills,
        "abcdefghijklmno,pqrs\r\n",
        rows![["abcdefghijklmno", "pqrs"]]
    );
    parses_to!(
        quoted_field_across_refills,
        "\"abcdefgh\r\nijklmnop\",q\r\n",
        rows![["abcdefgh\r\nijklmnop", "q"]]
    );

    fn b(s: &str) -> &[u8] {
        s.as_bytes()
    }

    #[test]
    fn counters_simple() {
        let mut parser =
            Parser::from_reader(b("one,two,three\r\n")).unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.char_count(), 15);
        assert_eq!(parser.row(), 1);
        assert_eq!(parser.raw_row(), 1);
        assert_eq!(parser.byte_count(), 0);
        assert!(!parser.read().unwrap());
        assert_eq!(parser.char_count(), 15);
    }

    #[test]
    fn counters_skip_comments_but_count_raw_rows() {
        let mut parser = ParserBuilder::new()
            .comment(Some(b'#'))
            .from_reader(b("# comment\r\n1,2\r\n"))
            .unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.row(), 1);
        assert_eq!(parser.raw_row(), 2);
        assert!(!parser.read().unwrap());
    }

    #[test]
    fn counters_skip_blank_lines_but_count_raw_rows() {
        let mut parser =
            Parser::from_reader(b("\r\n1,2\r\n")).unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.record().unwrap(), vec!["1", "2"]);
        assert_eq!(parser.row(), 1);
        assert_eq!(parser.raw_row(), 2);
    }

    #[test]
    fn raw_rows_count_inside_quotes() {
        let mut parser =
            Parser::from_reader(b("\"a\r\nb\nc\",d\r\n")).unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.row(), 1);
        assert_eq!(parser.raw_row(), 3);
    }

    #[test]
    fn byte_count_default_encoding() {
        let data = "a,b\r\nc,d\r\n";
        let mut parser = ParserBuilder::new()
            .count_bytes(true)
            .from_reader(data.as_bytes())
            .unwrap();
        while parser.read().unwrap() {}
        assert_eq!(parser.byte_count(), data.len() as u64);
        assert_eq!(parser.char_count(), data.len() as u64);
    }

    #[test]
    fn byte_count_custom_encoding() {
        let data = "a,b\r\nc,d\r\n";
        let mut parser = ParserBuilder::new()
            .encoding(FixedWidth::new(2))
            .from_reader(data.as_bytes())
            .unwrap();
        while parser.read().unwrap() {}
        assert_eq!(parser.byte_count(), 2 * data.len() as u64);
    }

    #[test]
    fn byte_count_covers_skipped_lines() {
        let data = "#comment\n\r\na\n";
        let mut parser = ParserBuilder::new()
            .comment(Some(b'#'))
            .count_bytes(true)
            .from_reader(data.as_bytes())
            .unwrap();
        while parser.read().unwrap() {}
        assert_eq!(parser.byte_count(), data.len() as u64);
    }

    #[test]
    fn raw_record_includes_terminator() {
        let mut parser =
            Parser::from_reader(b("a,\"b\"\"c\"\nd\n")).unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.raw_record(), b("a,\"b\"\"c\"\n"));
        assert_eq!(parser.field_raw(0), Some(b("a")));
        assert_eq!(parser.field_raw(1), Some(b("\"b\"\"c\"")));
        assert_eq!(parser.field(1).unwrap(), Some(b("b\"c")));
        assert!(parser.read().unwrap());
        assert_eq!(parser.raw_record(), b("d\n"));
    }

    #[test]
    fn field_spans_expose_quote_counts() {
        let mut parser =
            Parser::from_reader(b("a,\"b\"\"c\"\n")).unwrap();
        assert!(parser.read().unwrap());
        let span = parser.field_span(0).unwrap();
        assert_eq!((span.start(), span.len(), span.quote_count()), (0, 1, 0));
        let span = parser.field_span(1).unwrap();
        assert_eq!((span.start(), span.len(), span.quote_count()), (2, 6, 4));
        assert_eq!(parser.field_span(2), None);
    }

    #[test]
    fn out_of_range_fields_are_none() {
        let mut parser = Parser::from_reader(b("a,b\n")).unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.field_count(), 2);
        assert_eq!(parser.field(2).unwrap(), None);
        assert_eq!(parser.field_raw(2), None);
    }

    /// Yields one queued chunk per read call, so data "appended" after a
    /// record was consumed becomes visible to a later refill.
    struct Feed {
        chunks: Vec<&'static [u8]>,
        next: usize,
    }

    impl io::Read for Feed {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.get(self.next) {
                None => Ok(0),
                Some(chunk) => {
                    assert!(chunk.len() <= buf.len());
                    buf[..chunk.len()].copy_from_slice(chunk);
                    self.next += 1;
                    Ok(chunk.len())
                }
            }
        }
    }

    #[test]
    fn sequential_refill_after_consumed_record() {
        let feed = Feed {
            chunks: vec![&b"1,2\r\n"[..], &b"3,4\r\n"[..]],
            next: 0,
        };
        let mut parser = Parser::from_reader(feed).unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.record().unwrap(), vec!["1", "2"]);
        assert!(parser.read().unwrap());
        assert_eq!(parser.record().unwrap(), vec!["3", "4"]);
        assert!(!parser.read().unwrap());
        assert!(parser.is_done());
    }

    #[test]
    fn read_stays_false_after_end_of_stream() {
        let mut parser = Parser::from_reader(b("a\n")).unwrap();
        assert!(parser.read().unwrap());
        assert!(!parser.read().unwrap());
        assert!(!parser.read().unwrap());
        assert_eq!(parser.field_count(), 0);
    }

    #[test]
    fn bad_data_fires_once_per_malformed_field_with_context() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = hits.clone();
        let mut parser = ParserBuilder::new()
            .on_bad_data(move |bad| {
                sink.borrow_mut().push((
                    bad.row(),
                    bad.raw_row(),
                    bad.record().to_vec(),
                ));
                Ok(())
            })
            .from_reader(b("ok, \"stray\",fine\r\nnext\r\n"))
            .unwrap();
        assert!(parser.read().unwrap());
        let record = parser.record().unwrap();
        assert_eq!(record, vec!["ok", " \"stray\"", "fine"]);
        {
            let hits = hits.borrow();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].0, 1);
            assert_eq!(hits[0].1, 1);
            assert_eq!(hits[0].2, b"ok, \"stray\",fine\r\n");
        }
        assert!(parser.read().unwrap());
        parser.record().unwrap();
        assert_eq!(hits.borrow().len(), 1);
    }

    #[test]
    fn bad_data_handler_sees_configuration() {
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let mut parser = ParserBuilder::new()
            .delimiter(b";")
            .on_bad_data(move |bad| {
                *sink.borrow_mut() =
                    Some(bad.config().delimiter().to_vec());
                Ok(())
            })
            .from_reader(b("\"unclosed"))
            .unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.field(0).unwrap(), Some(b("unclosed")));
        assert_eq!(seen.borrow().as_deref(), Some(&b";"[..]));
    }

    #[test]
    fn error_on_bad_data_aborts_processing() {
        let mut parser = ParserBuilder::new()
            .error_on_bad_data(true)
            .from_reader(b("\"unclosed\r\n"))
            .unwrap();
        assert!(parser.read().unwrap());
        let err = parser.field(0).unwrap_err();
        assert!(matches!(*err.kind(), ErrorKind::BadData { .. }));
        // The raw view is still reachable after the abort.
        assert_eq!(parser.field_raw(0), Some(b("\"unclosed\r\n")));
    }

    #[test]
    fn aborting_handler_stops_record_materialization() {
        let mut parser = ParserBuilder::new()
            .on_bad_data(|_| Err("told you so".into()))
            .from_reader(b("a,\"b,c\r\n"))
            .unwrap();
        assert!(parser.read().unwrap());
        let err = parser.record().unwrap_err();
        match err.into_kind() {
            ErrorKind::BadData { err: Some(inner), .. } => {
                assert_eq!(inner.to_string(), "told you so");
            }
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    struct Failing;

    impl io::Read for Failing {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        }
    }

    #[test]
    fn io_errors_surface_from_read() {
        let mut parser = Parser::from_reader(Failing).unwrap();
        let err = parser.read().unwrap_err();
        assert!(err.is_io_error());
    }

    struct InterruptedOnce {
        data: &'static [u8],
        interrupted: bool,
    }

    impl io::Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "again",
                ));
            }
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let source = InterruptedOnce { data: b"a,b\n", interrupted: false };
        let mut parser = Parser::from_reader(source).unwrap();
        assert!(parser.read().unwrap());
        assert_eq!(parser.record().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn records_iterator() {
        let mut parser = Parser::from_reader(b("a,b\nc,d\n")).unwrap();
        let records: Vec<Record> =
            parser.records().collect::<crate::Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], vec!["a", "b"]);
        assert_eq!(records[1], vec!["c", "d"]);
    }

    #[test]
    fn into_records_iterator() {
        let parser = Parser::from_reader(b("a\nb\n")).unwrap();
        let records: Vec<Record> =
            parser.into_records().collect::<crate::Result<_>>().unwrap();
        assert_eq!(records, vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn read_into_reuses_allocations() {
        let mut parser =
            Parser::from_reader(b("first,record\nx\n")).unwrap();
        let mut record = Record::new();
        assert!(parser.read_into(&mut record).unwrap());
        assert_eq!(record, vec!["first", "record"]);
        assert!(parser.read_into(&mut record).unwrap());
        assert_eq!(record, vec!["x"]);
        assert!(!parser.read_into(&mut record).unwrap());
        assert!(record.is_empty());
    }

    #[test]
    fn into_inner_returns_the_source() {
        let mut parser = Parser::from_reader(b("a\nb\n")).unwrap();
        assert!(parser.read().unwrap());
        let rest = parser.into_inner();
        // The parser buffers ahead, so the source may already be
        // exhausted; what matters is that it comes back unclosed.
        assert!(rest.len() <= 4);
    }

    #[test]
    fn invalid_configurations_fail_at_construction() {
        assert!(ParserBuilder::new()
            .delimiter(b"")
            .from_reader(b(""))
            .is_err());
        assert!(ParserBuilder::new()
            .delimiter(b"\n")
            .from_reader(b(""))
            .is_err());
        assert!(ParserBuilder::new()
            .delimiter(b"\"")
            .from_reader(b(""))
            .is_err());
        assert!(ParserBuilder::new()
            .quote(b'\0')
            .from_reader(b(""))
            .is_err());
        assert!(ParserBuilder::new()
            .delimiter(b"\\")
            .escape(b'\\')
            .from_reader(b(""))
            .is_err());
    }
}
