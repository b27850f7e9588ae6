// Duplicate photo detection against previously accepted submissions:
// - exact duplicates (same content hash), including the participant's own
//   earlier uploads, which are flagged as such
// - near duplicates (perceptual hash within the configured Hamming distance)
//   from other participants only

use crate::core::hash::PhotoHashes;
use crate::core::submission::{Identity, PriorSubmission, SubmissionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedSubmission {
    pub id: SubmissionId,
    pub identity: Identity,
    /// The prior belongs to the identity being screened.
    pub same_identity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearMatch {
    pub matched: MatchedSubmission,
    pub distance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSignal {
    /// Every prior with the same content hash, in id order, own uploads included.
    pub exact_matches: Vec<MatchedSubmission>,
    /// Closest perceptual match that is not already an exact match.
    pub near_match: Option<NearMatch>,
}

impl DuplicateSignal {
    /// Another identity already submitted the same bytes.
    pub fn is_exact(&self) -> bool {
        self.exact_matches.iter().any(|m| !m.same_identity)
    }

    /// The same identity already submitted the same bytes.
    pub fn is_repeat(&self) -> bool {
        self.exact_matches.iter().any(|m| m.same_identity)
    }

    pub fn cross_identity_matches(&self) -> impl Iterator<Item = &MatchedSubmission> {
        self.exact_matches.iter().filter(|m| !m.same_identity)
    }

    pub fn own_matches(&self) -> impl Iterator<Item = &MatchedSubmission> {
        self.exact_matches.iter().filter(|m| m.same_identity)
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    threshold: u32,
}

impl DuplicateDetector {
    /// `threshold` is exclusive: a distance strictly below it is a near match.
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Compare a new submission's hashes against the prior snapshot.
    ///
    /// Exact matches owned by `identity` itself are reported with
    /// `same_identity` set; its own priors are never near-match candidates.
    /// Returns `None` when nothing matched.
    pub fn detect(
        &self,
        identity: &Identity,
        hashes: &PhotoHashes,
        prior: &[PriorSubmission],
    ) -> Option<DuplicateSignal> {
        let mut exact_matches = Vec::new();
        let mut near_match: Option<NearMatch> = None;

        for candidate in prior {
            let same_identity = &candidate.identity == identity;
            if candidate.hashes.exact == hashes.exact {
                exact_matches.push(MatchedSubmission {
                    id: candidate.id,
                    identity: candidate.identity.clone(),
                    same_identity,
                });
                continue;
            }
            if same_identity {
                continue;
            }

            let distance = match (&hashes.perceptual, &candidate.hashes.perceptual) {
                (Some(ours), Some(theirs)) => ours.distance(theirs),
                _ => None,
            };
            let Some(distance) = distance else {
                continue;
            };
            if distance >= self.threshold {
                continue;
            }

            let closer = match &near_match {
                None => true,
                Some(best) => {
                    distance < best.distance
                        || (distance == best.distance && candidate.id < best.matched.id)
                }
            };
            if closer {
                near_match = Some(NearMatch {
                    matched: MatchedSubmission {
                        id: candidate.id,
                        identity: candidate.identity.clone(),
                        same_identity: false,
                    },
                    distance,
                });
            }
        }

        if exact_matches.is_empty() && near_match.is_none() {
            return None;
        }

        exact_matches.sort_by_key(|m| m.id);
        Some(DuplicateSignal {
            exact_matches,
            near_match,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::{compute_content_hash, compute_hashes, fixtures, PerceptualHash};

    fn prior(id: i64, identity: &str, exact: &[u8], phash: Option<&str>) -> PriorSubmission {
        PriorSubmission {
            id: SubmissionId(id),
            identity: Identity::new(identity),
            hashes: PhotoHashes {
                exact: compute_content_hash(exact),
                perceptual: phash.map(|h| PerceptualHash::parse(h).unwrap()),
            },
        }
    }

    fn hashes(exact: &[u8], phash: Option<&str>) -> PhotoHashes {
        PhotoHashes {
            exact: compute_content_hash(exact),
            perceptual: phash.map(|h| PerceptualHash::parse(h).unwrap()),
        }
    }

    #[test]
    fn test_no_prior_no_signal() {
        let detector = DuplicateDetector::new(6);
        let new = hashes(b"photo", Some("0000000000000000"));
        assert_eq!(detector.detect(&Identity::new("1"), &new, &[]), None);
    }

    #[test]
    fn test_identical_photos_are_exact_match() {
        let bytes = fixtures::png(2);
        let a = compute_hashes(&bytes).unwrap();
        let b = compute_hashes(&bytes).unwrap();
        let history = [PriorSubmission {
            id: SubmissionId(1),
            identity: Identity::new("100"),
            hashes: a,
        }];

        let signal = DuplicateDetector::new(6)
            .detect(&Identity::new("200"), &b, &history)
            .unwrap();
        assert!(signal.is_exact());
        assert_eq!(signal.exact_matches[0].id, SubmissionId(1));
        assert_eq!(signal.near_match, None);
    }

    #[test]
    fn test_recompressed_photo_is_near_match() {
        let original = compute_hashes(&fixtures::png(4)).unwrap();
        let recompressed = compute_hashes(&fixtures::jpeg(4)).unwrap();
        let history = [PriorSubmission {
            id: SubmissionId(7),
            identity: Identity::new("100"),
            hashes: original,
        }];

        let signal = DuplicateDetector::new(6)
            .detect(&Identity::new("200"), &recompressed, &history)
            .unwrap();
        assert!(!signal.is_exact());
        let near = signal.near_match.unwrap();
        assert_eq!(near.matched.id, SubmissionId(7));
        assert_eq!(near.matched.identity, Identity::new("100"));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let history = [prior(1, "a", b"one", Some("00000000000000ff"))];
        // 8 bits differ
        let new = hashes(b"two", Some("0000000000000000"));

        assert!(DuplicateDetector::new(8).detect(&Identity::new("b"), &new, &history).is_none());
        assert!(DuplicateDetector::new(9).detect(&Identity::new("b"), &new, &history).is_some());
    }

    #[test]
    fn test_closest_near_match_and_all_exact_matches() {
        let history = [
            prior(5, "a", b"same", Some("0000000000000000")),
            prior(2, "b", b"same", Some("0000000000000000")),
            prior(3, "c", b"other", Some("0000000000000007")),
            prior(4, "d", b"another", Some("0000000000000001")),
            prior(6, "e", b"more", Some("0000000000000002")),
        ];
        let new = hashes(b"same", Some("0000000000000000"));

        let signal = DuplicateDetector::new(6)
            .detect(&Identity::new("z"), &new, &history)
            .unwrap();
        let exact_ids: Vec<_> = signal.exact_matches.iter().map(|m| m.id.0).collect();
        assert_eq!(exact_ids, vec![2, 5]);

        // Distance 1 for both 4 and 6; lowest id wins the tie
        let near = signal.near_match.unwrap();
        assert_eq!(near.distance, 1);
        assert_eq!(near.matched.id, SubmissionId(4));
    }

    #[test]
    fn test_own_reupload_is_reported_but_not_cross_identity() {
        let history = [prior(1, "a", b"same", Some("0000000000000000"))];
        let new = hashes(b"same", Some("0000000000000000"));

        let signal = DuplicateDetector::new(6)
            .detect(&Identity::new("a"), &new, &history)
            .unwrap();
        assert!(signal.is_repeat());
        assert!(!signal.is_exact());
        assert!(signal.exact_matches[0].same_identity);
        assert_eq!(signal.exact_matches[0].id, SubmissionId(1));
        assert_eq!(signal.near_match, None);
    }

    #[test]
    fn test_own_similar_photo_is_not_a_near_match() {
        let history = [prior(1, "a", b"first", Some("0000000000000000"))];
        let new = hashes(b"second", Some("0000000000000001"));
        assert!(DuplicateDetector::new(6).detect(&Identity::new("a"), &new, &history).is_none());
    }

    #[test]
    fn test_own_and_foreign_exact_matches_together() {
        let history = [
            prior(1, "a", b"same", None),
            prior(2, "b", b"same", None),
        ];
        let signal = DuplicateDetector::new(6)
            .detect(&Identity::new("a"), &hashes(b"same", None), &history)
            .unwrap();
        assert!(signal.is_exact());
        assert!(signal.is_repeat());
        let foreign: Vec<_> = signal.cross_identity_matches().map(|m| m.id.0).collect();
        assert_eq!(foreign, vec![2]);
    }

    #[test]
    fn test_missing_perceptual_hash_still_matches_exactly() {
        let history = [
            prior(1, "a", b"same", None),
            prior(2, "b", b"different", Some("0000000000000000")),
        ];
        let new = hashes(b"same", None);

        let signal = DuplicateDetector::new(6)
            .detect(&Identity::new("z"), &new, &history)
            .unwrap();
        assert_eq!(signal.exact_matches.len(), 1);
        assert!(signal.near_match.is_none());
    }
}
