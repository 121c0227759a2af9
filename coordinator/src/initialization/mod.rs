mod builder;
mod constant;
mod error;
mod param_gen;
mod random;

pub use builder::init_weights;
pub use constant::ConstParamGen;
pub use error::{InitErr, Result};
pub use param_gen::ParamGen;
pub use random::RandParamGen;
