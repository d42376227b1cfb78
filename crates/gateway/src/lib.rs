//! `tp-gateway`: the `toolport` binary's library half: config loading,
//! boot and shutdown of the primary tool providers, delegate agents and
//! their tool lifecycle, and the CLI commands.

pub mod agents;
pub mod bootstrap;
pub mod cli;
pub mod health;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
