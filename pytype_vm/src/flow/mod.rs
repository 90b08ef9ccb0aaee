//! Variables and the per-block state they flow through.

mod state;
mod variables;

pub use state::BlockState;
pub use variables::{Binding, Origin, Variable};
