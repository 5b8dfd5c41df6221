pub mod command;
pub mod fasta;
pub mod file;
pub mod system;
