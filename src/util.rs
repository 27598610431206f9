//! Re-exports types depending on crate enabled features.

#[cfg(feature = "fast-hasher")]
type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
#[cfg(not(feature = "fast-hasher"))]
type BuildHasher = std::collections::hash_map::RandomState;

pub type HashMap<K, V> = std::collections::HashMap<K, V, BuildHasher>;
pub type HashSet<K> = std::collections::HashSet<K, BuildHasher>;
