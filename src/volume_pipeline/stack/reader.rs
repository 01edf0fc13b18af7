use crate::volume_pipeline::common::error::Result;
use crate::volume_pipeline::stack::types::RawStack;

pub trait StackReader {
    fn read_stack(&self, data: &[u8]) -> Result<RawStack>;
}
