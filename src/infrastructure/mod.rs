pub mod parsers;
pub mod postgres;
