use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::result;

use crate::config::Config;

/// A type alias for `Result<T, delimit::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// A boxed error, as returned by a bad data handler to abort parsing.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A handler invoked when the field processor finds malformed quoting.
///
/// Returning `Err` aborts the call that was processing the field; the
/// parser does not catch the error and remains safe to drop.
pub type BadDataHandler =
    Box<dyn FnMut(&BadData) -> result::Result<(), BoxError> + 'static>;

/// An error that can occur when parsing delimited text.
///
/// For in-memory sources with default options, errors are impossible:
/// the tokenizer itself never fails, so the only error sources are the
/// character source, construction-time validation and an aborting bad
/// data handler.
#[derive(Debug)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error(Box::new(kind))
    }

    pub(crate) fn config<S: Into<String>>(msg: S) -> Error {
        Error::new(ErrorKind::Config(msg.into()))
    }

    pub(crate) fn bad_data(
        row: u64,
        raw_row: u64,
        err: Option<BoxError>,
    ) -> Error {
        Error::new(ErrorKind::BadData { row, raw_row, err })
    }

    /// Return the specific type of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwrap this error into its underlying type.
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns true if and only if this is an I/O error.
    ///
    /// If this is true, the underlying `ErrorKind` is guaranteed to be
    /// `ErrorKind::Io`.
    pub fn is_io_error(&self) -> bool {
        matches!(*self.0, ErrorKind::Io(_))
    }
}

/// The specific type of an error.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An I/O error that occurred while reading from the character source.
    Io(io::Error),
    /// An invalid combination of delimiter, quote and escape characters,
    /// reported when the parser is built.
    Config(String),
    /// Malformed quoting aborted field processing, either because the
    /// installed bad data handler returned an error or because the parser
    /// was configured to treat bad data as an error.
    BadData {
        /// The logical row holding the malformed field.
        row: u64,
        /// The raw row at which the record containing the field ended.
        raw_row: u64,
        /// The handler's error, if a handler was installed.
        err: Option<BoxError>,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::new(ErrorKind::Io(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self.0 {
            ErrorKind::Io(ref err) => Some(err),
            ErrorKind::Config(_) => None,
            ErrorKind::BadData { ref err, .. } => {
                err.as_ref().map(|e| &**e as &(dyn StdError + 'static))
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.0 {
            ErrorKind::Io(ref err) => err.fmt(f),
            ErrorKind::Config(ref msg) => {
                write!(f, "invalid parser configuration: {}", msg)
            }
            ErrorKind::BadData { row, raw_row, err: None } => {
                write!(
                    f,
                    "malformed quoting in record {} (raw row {})",
                    row, raw_row
                )
            }
            ErrorKind::BadData { row, raw_row, err: Some(ref err) } => {
                write!(
                    f,
                    "malformed quoting in record {} (raw row {}): {}",
                    row, raw_row, err
                )
            }
        }
    }
}

/// The context handed to a bad data handler.
///
/// All accessors refer to the record whose field was being processed when
/// malformed quoting was found.
pub struct BadData<'a> {
    pub(crate) record: &'a [u8],
    pub(crate) row: u64,
    pub(crate) raw_row: u64,
    pub(crate) config: &'a Config,
}

impl<'a> BadData<'a> {
    /// The raw bytes of the record, exactly as they appear in the source,
    /// including the trailing line terminator when one was present.
    pub fn record(&self) -> &[u8] {
        self.record
    }

    /// The logical row of the record (records delivered so far).
    pub fn row(&self) -> u64 {
        self.row
    }

    /// The raw row at which the record ended.
    pub fn raw_row(&self) -> u64 {
        self.raw_row
    }

    /// The configuration of the parser that found the bad data.
    pub fn config(&self) -> &Config {
        self.config
    }
}

impl<'a> fmt::Debug for BadData<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BadData")
            .field("record", &String::from_utf8_lossy(self.record))
            .field("row", &self.row)
            .field("raw_row", &self.raw_row)
            .finish()
    }
}
