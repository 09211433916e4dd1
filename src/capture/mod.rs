pub mod decoder;
pub mod source;
