use std::sync::Arc;

use bw_service::BranchwaterService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<BranchwaterService>,
}
impl AppState {
	pub async fn new(config: bw_config::Config) -> color_eyre::Result<Self> {
		let service = BranchwaterService::connect(config).await?;

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: BranchwaterService) -> Self {
		Self { service: Arc::new(service) }
	}
}
