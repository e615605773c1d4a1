//! The authentication decision rule.
//!
//! A pure function over the classifier output: no state, no error path.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Prediction;

/// Label assigned to the authorized identity at training time.
/// Label 0 is the unauthorized class.
pub const AUTHORIZED_LABEL: i32 = 1;

/// Distance ceiling for a positive match. The comparison is strict:
/// a confidence exactly at the threshold is NOT authenticated.
pub const MATCH_THRESHOLD: f32 = 55.0;

/// Binary outcome of the authentication check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Authenticated,
    #[serde(rename = "Not Authenticated")]
    NotAuthenticated,
}

impl Verdict {
    pub fn is_authenticated(self) -> bool {
        matches!(self, Verdict::Authenticated)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Authenticated => f.write_str("Authenticated"),
            Verdict::NotAuthenticated => f.write_str("Not Authenticated"),
        }
    }
}

/// Decide with the built-in constants.
pub fn decide(prediction: &Prediction) -> Verdict {
    decide_with(prediction, AUTHORIZED_LABEL, MATCH_THRESHOLD)
}

/// Authenticated iff the label matches the authorized identity AND the
/// distance-style confidence is strictly below the threshold.
pub fn decide_with(prediction: &Prediction, authorized_label: i32, threshold: f32) -> Verdict {
    if prediction.label == authorized_label && prediction.confidence < threshold {
        Verdict::Authenticated
    } else {
        Verdict::NotAuthenticated
    }
}
