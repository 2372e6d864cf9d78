pub mod api;
pub mod categorizer;
pub mod completion;
pub mod critic;
pub mod llm;
pub mod names;
pub mod planner;
pub mod refiner;
pub mod workflow;
pub mod writer;

#[cfg(test)]
pub mod testing;
