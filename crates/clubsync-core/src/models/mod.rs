//! Data models for clubsync

mod club;

#[cfg(test)]
pub(crate) use club::sample_fields;
pub use club::{
    Club, ClubFields, ClubId, Coordinates, ExternalLink, NaturalKey, ValidationError,
};
