//! CLI subcommand implementations for jweave

pub mod bundle;
pub mod catalog;
pub mod inspect;
pub mod run;
pub mod weave;
