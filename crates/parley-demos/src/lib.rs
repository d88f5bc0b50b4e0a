//! Demonstrations built on `parley-rs`.
//!
//! Each module is one walkthrough: it talks to a [`ChatBackend`], prints
//! what it does to stdout, and returns its results so they can be checked.
//!
//! | Module | Shows |
//! |--------|-------|
//! | [`sentiment`] | fixed 3-class structured output and accuracy |
//! | [`classify`] | label sets chosen at runtime |
//! | [`reasoning`] | reasoning effort levels |
//! | [`temperature`] | sampling temperature |
//! | [`history`] | windows, filters, token guard, persistence |
//! | [`ocr`] | PDF pages fanned out to a vision model |
//! | [`tools`] | dice and weather tools over several turns |
//!
//! [`ChatBackend`]: parley_rs::ChatBackend

pub mod classify;
pub mod context;
pub mod history;
pub mod ocr;
pub mod reasoning;
pub mod sentiment;
pub mod temperature;
pub mod tools;

pub use context::{DemoConfig, connect};

const RULE_WIDTH: usize = 70;

/// Print a title followed by a heavy rule.
pub fn heading(title: &str) {
    println!("{title}\n");
    println!("{}", "=".repeat(RULE_WIDTH));
}

/// Print a light rule between entries.
pub fn separator() {
    println!("{}", "-".repeat(RULE_WIDTH));
}
