mod successor_generator;

pub use successor_generator::SuccessorGenerator;
