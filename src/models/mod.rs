pub mod chain_model;
pub mod queries;
pub mod rate_model;
pub mod stat_model;
pub mod token_model;

pub use chain_model::*;
pub use rate_model::*;
pub use stat_model::*;
pub use token_model::*;
