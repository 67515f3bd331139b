//! Encrypted, periodicity-tagged PostgreSQL backups in S3-compatible storage.
//!
//! `db-backup` dumps, compresses and encrypts a database, uploads it into the
//! namespace of its periodicity class and prunes the class to its retention
//! count. `db-restore` brings the newest backup of a class back into a
//! database, replacing every table of the target schema.

// dbvault/src/lib.rs
pub mod artifact;
pub mod backup;
pub mod cli;
pub mod codec;
pub mod config;
pub mod errors;
pub mod policy;
pub mod restore;
pub mod storage;
pub mod tools;

#[cfg(test)]
mod testing;
