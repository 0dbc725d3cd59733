pub mod account;
pub mod proof;

pub use account::*;
pub use proof::*;
