pub mod interval;
pub mod protocol;
pub mod report;
pub mod rollup;
pub mod subnet;
