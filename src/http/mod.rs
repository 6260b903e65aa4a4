pub mod connection;
pub mod request;
pub mod response;

pub use connection::Connection;
pub use request::{Method, ParseState, Request};
pub use response::{error_response, Response};
