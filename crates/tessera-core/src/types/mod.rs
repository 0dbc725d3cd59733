pub mod committee;
pub mod execution;
pub mod statement;
