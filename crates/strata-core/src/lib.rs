//! Shared codec layer for the strata cache workspace.
//!
//! Cache keys serialize to deterministic strings (they become part of the
//! remote key), values serialize to bytes. Both directions are injected into
//! the cache engine at construction, so any wire format can be plugged in.

pub mod codec;

pub use codec::{
    CodecError, DisplayKeySerializer, JsonSerializer, KeySerializer, MessagePackSerializer,
    StringSerializer, ValueSerializer,
};
