pub mod filename;
pub mod fingerprint;
pub mod validation;
