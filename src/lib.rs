pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod polls;
pub mod protocol;
pub mod rooms;
pub mod sse;
pub mod startup;
pub mod sync;
pub mod viewer;
pub mod ws;
