pub mod convention;
pub mod macro_model;
