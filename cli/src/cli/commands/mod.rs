pub mod check;
pub mod start;
