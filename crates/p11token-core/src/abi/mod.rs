//! Token ABI: identifier spaces and the attribute blob codec.

pub mod blob;
pub mod ids;
