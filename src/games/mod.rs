//! Games shipped with the crate, each with its tracker, host rules and
//! reference bots.

pub mod dots_and_boxes;
pub mod guess_the_number;
