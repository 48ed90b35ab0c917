pub mod circuit;
pub mod error;
pub mod headers;
pub mod models;
pub mod ports;
