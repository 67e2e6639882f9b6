pub mod poll_repository;
pub mod vote_repository;

pub use poll_repository::*;
