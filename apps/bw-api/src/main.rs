use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = bw_api::Args::parse();

	bw_api::run(args).await
}
