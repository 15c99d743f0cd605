/*!
The `delimit` crate provides a fast, streaming parser for delimited text
("CSV" in the loose, real-world sense of the word).

The parser makes a single pass over its input, spending amortized
constant time per byte, and works for any source chunking and any buffer
capacity down to one byte. Records are pulled one at a time; fields are
handed out as zero-copy views into the parser's buffer and post-processed
(trimming, quote stripping, escape unfolding) lazily, per field.

Delimiters may be several bytes long. A false start on a multi-byte
delimiter costs at most one re-examined byte and never mis-attributes
data to the wrong field.

# Malformed data

CSV found in the wild is frequently invalid. Rather than fixing the
producers, this parser is deliberately flexible in what it accepts: the
tokenizer always finds *a* parse and never fails. Stray quotes, unclosed
quotes and (optionally) line breaks inside quoted fields are latched into
the field's quote count and reported when the field is processed, through
a configurable bad data sink that may observe, ignore or abort. In
particular:

* CRLF, LF and CR are each treated as a single record terminator.
* Records are permitted to be of varying length.
* Lines holding nothing but a terminator are skipped by default.
* A quoted field that never closes runs to the end of the stream and is
  delivered as a best-effort value.

# Example

This reads records from an in-memory buffer and collects the first field
of each:

```
use delimit::ParserBuilder;

# fn example() -> delimit::Result<()> {
let data = "\
city,country,pop
Boston,United States,4628910
Concord,United States,42695
";
let mut parser = ParserBuilder::new().from_reader(data.as_bytes())?;

let mut cities = Vec::new();
while parser.read()? {
    let record = parser.record()?;
    cities.push(String::from_utf8(record[0].to_vec()).unwrap());
}
assert_eq!(cities, vec!["city", "Boston", "Concord"]);
# Ok(()) }
# example().unwrap();
```

# Positions

The parser counts code units, logical rows (records delivered), raw rows
(line terminators seen, including inside quoted fields) and, when
enabled, encoded bytes. See [`Position`].
*/

#![deny(missing_docs)]

mod buffer;
mod config;
mod error;
mod field;
mod parser;
mod position;
mod record;

pub use crate::config::{Config, Trim};
pub use crate::error::{
    BadData, BadDataHandler, BoxError, Error, ErrorKind, Result,
};
pub use crate::parser::{IntoRecords, Parser, ParserBuilder, Records};
pub use crate::position::{Encoding, FixedWidth, Position, SingleByte};
pub use crate::record::{FieldSpan, Record, RecordIter};
