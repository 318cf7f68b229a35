pub mod csv;
pub mod signal;
pub mod uploads;
pub mod validate;
