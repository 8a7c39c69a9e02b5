//! Component G: the credential catalog and the rotation policy that picks
//! the next profile to try for a given provider.

pub mod resolver;
