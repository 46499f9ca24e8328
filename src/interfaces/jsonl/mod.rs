//! JSON-lines request/response protocol: one request per input line, one
//! response per request.

pub mod dispatcher;
pub mod request;
pub mod response;
