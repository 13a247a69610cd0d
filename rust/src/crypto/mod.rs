//! Envelope cryptography: key handling, the versioned codec, digest helpers,
//! and the failed-attempt tracker that throttles key guessing.

pub mod attempts;
pub mod envelope;
pub mod integrity;
pub mod keys;
