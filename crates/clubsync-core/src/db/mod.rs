//! Database layer for clubsync

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{ClubFilter, ClubStore, LibSqlClubRepository};
