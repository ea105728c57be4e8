//! Listing normalizer — raw marketplace records → `{name, price, grade}`.
//!
//! Pure: no I/O, no logging. Listings without a resolvable price are
//! dropped and reported as warnings; output order matches input order.

use crate::types::{NormalizationWarning, NormalizedListing, RawListing};

/// Normalizer output for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub listings: Vec<NormalizedListing>,
    /// One entry per dropped listing.
    pub warnings: Vec<NormalizationWarning>,
}

impl Normalized {
    pub fn dropped(&self) -> usize {
        self.warnings.len()
    }
}

/// Resolve the single price of a raw listing.
///
/// Auction records: buy-now price, else starting price. Market records:
/// current minimum price. Zero counts as absent.
pub fn resolve_price(raw: &RawListing) -> Option<u64> {
    let positive = |p: Option<u64>| p.filter(|&v| v > 0);
    match raw {
        RawListing::Auction(a) => {
            positive(a.auction_info.buy_price).or_else(|| positive(a.auction_info.start_price))
        }
        RawListing::Market(m) => positive(m.current_min_price),
        RawListing::Unrecognized(_) => None,
    }
}

/// Normalize one cycle's raw listings.
pub fn normalize(raw: &[RawListing]) -> Normalized {
    let mut out = Normalized {
        listings: Vec::with_capacity(raw.len()),
        warnings: Vec::new(),
    };

    for (index, listing) in raw.iter().enumerate() {
        let (name, grade) = match listing {
            RawListing::Auction(a) => (&a.name, &a.grade),
            RawListing::Market(m) => (&m.name, &m.grade),
            RawListing::Unrecognized(_) => {
                out.warnings.push(NormalizationWarning::UnrecognizedShape { index });
                continue;
            }
        };

        match resolve_price(listing) {
            Some(price) => out.listings.push(NormalizedListing {
                name: name.clone(),
                price,
                grade: grade.clone(),
            }),
            None => out.warnings.push(NormalizationWarning::NoPrice {
                index,
                name: name.clone(),
            }),
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
