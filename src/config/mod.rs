pub mod defs;
pub mod settings;
