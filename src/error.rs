//! Crate-wide error type: a tagged enum rather than a boxed `dyn Error`, so
//! every failure mode the engine recognizes gets its own variant instead of
//! being stringly typed.

use std::fmt;
use std::io;
use std::net::AddrParseError;

use crate::http::request::ParseError;
use crate::responder::DispatchError;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    AddrParse(AddrParseError),
    Config(serde_yaml::Error),
    Parse(ParseError),
    Dispatch(DispatchError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::AddrParse(e) => write!(f, "address parse error: {e}"),
            Error::Config(e) => write!(f, "configuration error: {e}"),
            Error::Parse(e) => write!(f, "request parse error: {e}"),
            Error::Dispatch(e) => write!(f, "dispatch error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::AddrParse(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Parse(_) | Error::Dispatch(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Self {
        Error::AddrParse(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<DispatchError> for Error {
    fn from(e: DispatchError) -> Self {
        Error::Dispatch(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
