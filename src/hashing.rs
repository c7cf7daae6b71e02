//! This module provides a deterministic hasher and the `HashMap` and `IndexMap` variants that use
//! it. The hashing data structures in the standard library are not deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! Lookups in the simulation only need speed and reproducibility, so we use `rustc_hash`.
//! Where iteration order is observable (neighborhoods, hysteresis factors, serialized
//! snapshots) the crate uses `IndexMap` instead, which preserves insertion order.
//!
//! `HashMap<K, V, S>` does not have a `new` method. Use `HashMap::default()` instead to create a
//! new hashmap with the default hasher.

use std::hash::BuildHasherDefault;

pub use rustc_hash::FxHasher;

pub type HashMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// An insertion ordered map using the same deterministic hasher.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;
