//! Internal building blocks (object model, zlib streaming) that power the
//! public store/refs/index/diff/merge/history APIs.

pub mod object;
pub mod zlib;
