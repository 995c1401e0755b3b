//! Wire types of the Responses API.

mod request;
mod response;
mod sse;

pub use request::*;
pub use response::*;
pub use sse::*;
