pub mod amount;
pub mod domain;
pub mod error;
