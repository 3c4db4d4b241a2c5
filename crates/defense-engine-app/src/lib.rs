//! Application crate: the cooperative game domain plus server wiring.

pub mod game;
