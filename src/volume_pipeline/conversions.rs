//! Pipeline conversions module
//!
//! This module contains orchestration logic for stack-to-bundle conversion.

mod assemble;
mod stack_to_npz;


pub use assemble::assemble;
pub use stack_to_npz::StackToNpzPipeline;
