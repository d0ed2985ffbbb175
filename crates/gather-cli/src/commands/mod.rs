pub mod log;
pub mod validate;
