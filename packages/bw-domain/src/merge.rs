use ahash::AHashMap;

use crate::{ContainmentMatch, EnrichedRecord, MetadataRecord, NullPolicy, Scores};

/// Rounds a score to two decimals, halves away from zero.
///
/// The product is snapped to nine decimals first so that values such as `0.145`, stored as
/// `0.14499999…`, still round up.
pub fn round_score(value: f64) -> f64 {
	if !value.is_finite() {
		return 0.0;
	}

	let scaled = (value.clamp(0.0, 1.0) * 100.0 * 1e9).round() / 1e9;

	scaled.round() / 100.0
}

/// Joins metadata records with containment matches on accession.
///
/// Output keeps the record order. When several matches share an accession the first one in
/// `matches` wins; records without a match carry no scores.
pub fn merge(
	matches: &[ContainmentMatch],
	records: Vec<MetadataRecord>,
	policy: NullPolicy,
) -> Vec<EnrichedRecord> {
	let mut index: AHashMap<&str, &ContainmentMatch> = AHashMap::with_capacity(matches.len());

	for hit in matches {
		index.entry(hit.accession.as_str()).or_insert(hit);
	}

	records
		.into_iter()
		.map(|record| {
			let scores = index.get(record.accession.as_str()).map(|hit| Scores {
				containment: round_score(hit.containment),
				cani: round_score(hit.cani),
			});
			let fields =
				record.fields.into_iter().map(|(name, value)| (name, policy.apply(value))).collect();

			EnrichedRecord { accession: record.accession, fields, scores, is_member: false }
		})
		.collect()
}
