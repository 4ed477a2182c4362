pub mod cut;
pub mod extensive;
pub mod instance;
pub mod stage;
pub mod state;
