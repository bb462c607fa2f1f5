pub mod backend;
pub mod config;
pub mod deck;
pub mod error;
pub mod ir;
pub mod matcher;
pub mod parser;
pub mod search;
pub mod signals;
pub mod simulator;
pub mod transform;
pub mod workspace;
