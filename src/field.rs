use memchr::memchr2;

use crate::config::Config;
use crate::error::{BadData, BadDataHandler, Error, Result};

/// Where malformed quoting is reported while one field is processed.
///
/// The report fires at most once per processing pass, no matter how many
/// pipeline stages object to the field.
pub(crate) struct Sink<'h, 'c> {
    pub handler: &'h mut Option<BadDataHandler>,
    pub strict: bool,
    pub record: &'c [u8],
    pub row: u64,
    pub raw_row: u64,
    pub config: &'c Config,
    pub fired: bool,
}

impl<'h, 'c> Sink<'h, 'c> {
    fn report(&mut self) -> Result<()> {
        if self.fired {
            return Ok(());
        }
        self.fired = true;
        match self.handler.as_mut() {
            Some(handler) => {
                let context = BadData {
                    record: self.record,
                    row: self.row,
                    raw_row: self.raw_row,
                    config: self.config,
                };
                handler(&context).map_err(|err| {
                    Error::bad_data(self.row, self.raw_row, Some(err))
                })
            }
            None if self.strict => {
                Err(Error::bad_data(self.row, self.raw_row, None))
            }
            None => Ok(()),
        }
    }
}

/// Transform one raw field into its processed form: outer trim, quote
/// stripping, inner trim, quoted-line-break check, escape unfolding.
///
/// The returned slice points into `raw` unless escape unfolding had to
/// copy, in which case it points into `scratch`. Malformed fields produce
/// a best-effort value and report to `sink` once.
pub(crate) fn process<'a>(
    raw: &'a [u8],
    quotes: u32,
    config: &Config,
    scratch: &'a mut Vec<u8>,
    sink: &mut Sink,
) -> Result<&'a [u8]> {
    let mut field = raw;
    if config.trim.outer() {
        field = trim(field, &config.whitespace);
    }
    if quotes == 0 {
        return Ok(field);
    }
    let quote = config.quote;
    if field.len() >= 2 && field[0] == quote && field[field.len() - 1] == quote
    {
        field = &field[1..field.len() - 1];
        if config.trim.inner() {
            field = trim(field, &config.whitespace);
        }
        if config.line_break_in_quotes_is_bad_data
            && memchr2(b'\r', b'\n', field).is_some()
        {
            sink.report()?;
        }
        if quotes != 2 {
            field = unfold(field, quote, config.escape(), scratch, sink)?;
        }
        Ok(field)
    } else if field.first() == Some(&quote) {
        // An opening quote that never closed. Keep everything after it.
        sink.report()?;
        field = &field[1..];
        if quotes > 1 {
            field = unfold(field, quote, config.escape(), scratch, sink)?;
        }
        Ok(field)
    } else {
        // A stray quote inside an unquoted field.
        sink.report()?;
        Ok(field)
    }
}

/// Copy `field` into `scratch`, folding each escaped quote down to a
/// single quote. An escape that precedes anything other than the quote is
/// reported and kept verbatim.
fn unfold<'a>(
    field: &[u8],
    quote: u8,
    escape: u8,
    scratch: &'a mut Vec<u8>,
    sink: &mut Sink,
) -> Result<&'a [u8]> {
    scratch.clear();
    let mut i = 0;
    while i < field.len() {
        let unit = field[i];
        if unit == escape {
            match field.get(i + 1) {
                Some(&next) if next == quote => {
                    scratch.push(next);
                    i += 2;
                }
                _ => {
                    sink.report()?;
                    scratch.push(unit);
                    i += 1;
                }
            }
        } else {
            scratch.push(unit);
            i += 1;
        }
    }
    Ok(&scratch[..])
}

fn trim<'a>(mut field: &'a [u8], whitespace: &[u8]) -> &'a [u8] {
    while let Some((&first, rest)) = field.split_first() {
        if !whitespace.contains(&first) {
            break;
        }
        field = rest;
    }
    while let Some((&last, rest)) = field.split_last() {
        if !whitespace.contains(&last) {
            break;
        }
        field = rest;
    }
    field
}
