use serde::{Deserialize, Serialize};

/// One reference sample reported by the containment index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainmentMatch {
	pub accession: String,
	pub containment: f64,
	#[serde(rename = "cANI")]
	pub cani: f64,
}
impl ContainmentMatch {
	/// Derives cANI from containment as `containment^(1/ksize)`.
	pub fn from_containment(accession: impl Into<String>, containment: f64, ksize: u32) -> Self {
		let containment = containment.clamp(0.0, 1.0);
		let cani = containment.powf(1.0 / ksize.max(1) as f64);

		Self { accession: accession.into(), containment, cani }
	}
}
