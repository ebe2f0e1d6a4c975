//! Online template discovery (Drain) and template matching.

mod drain;
mod matcher;

pub use drain::{DrainClusterer, DrainConfig, Template, WILDCARD};
pub use matcher::match_template;
