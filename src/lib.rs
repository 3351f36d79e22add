pub mod demo;
pub mod error;
pub mod gtpu;
pub mod net;
pub mod pdcp;
pub mod queue;
pub mod rlc;
pub mod sim;

#[cfg(test)]
mod test;
