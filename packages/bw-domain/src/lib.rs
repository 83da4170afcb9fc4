pub mod allow_list;
pub mod matches;
pub mod merge;
pub mod record;
pub mod signature;

mod error;

pub use allow_list::AllowList;
pub use error::{Error, Result};
pub use matches::ContainmentMatch;
pub use merge::{merge, round_score};
pub use record::{
	ACCESSION_KEY, EnrichedRecord, MetadataRecord, NOT_PROVIDED, NullPolicy, Scores,
};
pub use signature::{Molecule, SketchSignature, parse_sourmash};
