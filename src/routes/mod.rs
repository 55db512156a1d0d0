//! JSON route handlers behind `handle_request`.

pub mod cart;
pub mod identity;
pub mod owned;
pub mod progress;
pub mod storage;
pub mod util;
