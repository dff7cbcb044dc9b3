//! Streaming zlib (de)compression for loose object payloads.

pub mod stream;
