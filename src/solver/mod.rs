pub mod adapter;
pub mod backend;
pub mod lp;
pub mod traits;
