//! Convenience re-exports for consumers of this crate and for its own
//! modules.

pub use crate::address::{Address, AddressType};
pub use crate::clock::{Clock, SystemClock};
pub use crate::config::AppConfig;
pub use crate::connection::Connection;
pub use crate::error::{Error, Result};
pub use crate::http::http_connection::{ConnState, HttpConnection, MAX_REQUEST_SIZE};
pub use crate::http::request::{CaseInsensitiveMap, HttpRequest, Method, ParseError};
pub use crate::http::response::HttpResponse;
pub use crate::responder::{dispatch, resolve_vhost, DispatchError, Responder, ResponderContext, ResponderList};
pub use crate::server::Server;
