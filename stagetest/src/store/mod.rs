//! Keyed persistence store.
//!
//! Values are written under a working directory so a later process, possibly
//! a different run of the test binary, can pick up where an earlier one
//! stopped. Each key is one file at `<working_dir>/.test-data/<key>.<ext>`.
//!
//! The store keeps no in-memory state; every call goes to disk. One owner per
//! working directory is assumed and nothing is locked.

mod codec;
mod file;

pub use codec::{Codec, JsonCodec};
pub use file::{FileStore, DEFAULT_DATA_DIR, PROVISION_OPTIONS_KEY};
