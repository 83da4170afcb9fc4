//! Command-line presentation shared by the branchwater binaries.

use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Shown by `--version` in its long form; names the metadata backends compiled in.
pub const LONG_VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"\nmetadata backends: columnar (duckdb), document (mongodb)",
	"\nsignature format: sourmash JSON",
);

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default() | Effects::BOLD)
		.usage(AnsiColor::Green.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Yellow.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}
