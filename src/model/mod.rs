mod normed_linear;
mod resnet;

pub use normed_linear::*;
pub use resnet::*;
