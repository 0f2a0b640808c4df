#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Pure helpers shared by the mdxp crates: file reads, path normalization,
//! content fingerprints and JSON-with-comments.

pub mod fingerprint;
pub mod fs;
pub mod jsonc;
pub mod path;
