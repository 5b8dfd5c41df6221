pub mod assembly_qc;
pub mod graph;
