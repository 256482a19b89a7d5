//! Score normalization and feedback.
//!
//! Raw similarity → integer score in [0, 100] via fixed piecewise-linear knots,
//! score → grade band via an inclusive lower-bound table, band → feedback via
//! one template per band. All three are pure table lookups.

use crate::models::Grade;

use super::scorer::{RAW_MAX, RAW_MIN};

/// (raw similarity, score) knots, strictly increasing in both columns
/// except the flat floor. Raw values outside the table clamp to its ends.
///
/// Uncorrelated or anti-correlated strokes score 0. A different character
/// lands below 0.5 raw, so it stays in band E; the same drawing redrawn
/// slightly shifted or thicker lands above 0.9.
const SCORE_KNOTS: [(f32, f32); 6] = [
    (RAW_MIN, 0.0),
    (0.0, 0.0),
    (0.5, 40.0),
    (0.75, 70.0),
    (0.9, 90.0),
    (RAW_MAX, 100.0),
];

/// Inclusive lower score bound per band, best band first.
const GRADE_THRESHOLDS: [(u8, Grade); 5] = [
    (90, Grade::S),
    (80, Grade::A),
    (70, Grade::B),
    (60, Grade::C),
    (50, Grade::D),
];

/// Placeholder replaced by the target's display name.
const NAME_SLOT: &str = "{name}";

const FEEDBACK_TEMPLATES: [(Grade, &str); 6] = [
    (Grade::S, "Outstanding! Your {name} is practically professional."),
    (Grade::A, "Excellent work! Your {name} is instantly recognizable."),
    (Grade::B, "Very good! Your {name} has the right shape, keep refining the details."),
    (Grade::C, "Nice effort! Your {name} is getting there."),
    (Grade::D, "Not bad. Your {name} has some of the key features, keep practicing!"),
    (Grade::E, "Keep practicing! Take another look at {name} and try again."),
];

/// Map a raw similarity to `(score, grade)`. NaN maps to the floor.
pub fn normalize(raw: f32) -> (u8, Grade) {
    let score = score_for(raw);
    (score, grade_for(score))
}

fn score_for(raw: f32) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    let (first_raw, first_score) = SCORE_KNOTS[0];
    if raw <= first_raw {
        return first_score as u8;
    }
    for pair in SCORE_KNOTS.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if raw <= x1 {
            let t = (raw - x0) / (x1 - x0);
            let score = y0 + t * (y1 - y0);
            return score.round().clamp(0.0, 100.0) as u8;
        }
    }
    100
}

/// Band for an integer score; thresholds are inclusive lower bounds.
pub fn grade_for(score: u8) -> Grade {
    GRADE_THRESHOLDS
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::E)
}

/// Fixed feedback sentence for a band, naming the target.
pub fn feedback(grade: Grade, target_name: &str) -> String {
    template_for(grade).replace(NAME_SLOT, target_name)
}

fn template_for(grade: Grade) -> &'static str {
    FEEDBACK_TEMPLATES
        .iter()
        .find(|(g, _)| *g == grade)
        .map(|(_, template)| *template)
        .unwrap_or(FEEDBACK_TEMPLATES[FEEDBACK_TEMPLATES.len() - 1].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bounded_for_all_raw_values() {
        let specials = [RAW_MIN, RAW_MAX, -10.0, 10.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY];
        for raw in specials {
            let (score, _) = normalize(raw);
            assert!(score <= 100, "raw {raw} gave {score}");
        }
        let mut raw = -1.5f32;
        while raw <= 1.5 {
            assert!(normalize(raw).0 <= 100);
            raw += 0.001;
        }
    }

    #[test]
    fn range_endpoints_map_to_bounds() {
        assert_eq!(normalize(RAW_MIN), (0, Grade::E));
        assert_eq!(normalize(RAW_MAX), (100, Grade::S));
        assert_eq!(normalize(f32::NAN), (0, Grade::E));
        assert_eq!(normalize(f32::INFINITY), (100, Grade::S));
        assert_eq!(normalize(f32::NEG_INFINITY), (0, Grade::E));
    }

    #[test]
    fn normalize_is_monotonic() {
        let mut previous = 0u8;
        let mut raw = RAW_MIN;
        while raw <= RAW_MAX {
            let (score, _) = normalize(raw);
            assert!(score >= previous, "score dropped at raw {raw}");
            previous = score;
            raw += 0.0005;
        }
    }

    #[test]
    fn knot_values_map_exactly() {
        assert_eq!(normalize(0.0).0, 0);
        assert_eq!(normalize(0.5).0, 40);
        assert_eq!(normalize(0.75).0, 70);
        assert_eq!(normalize(0.9).0, 90);
    }

    #[test]
    fn raw_at_band_threshold_lands_in_higher_band() {
        assert_eq!(normalize(0.9), (90, Grade::S));
    }

    #[test]
    fn grade_thresholds_are_inclusive() {
        assert_eq!(grade_for(100), Grade::S);
        assert_eq!(grade_for(90), Grade::S);
        assert_eq!(grade_for(89), Grade::A);
        assert_eq!(grade_for(80), Grade::A);
        assert_eq!(grade_for(79), Grade::B);
        assert_eq!(grade_for(70), Grade::B);
        assert_eq!(grade_for(60), Grade::C);
        assert_eq!(grade_for(59), Grade::D);
        assert_eq!(grade_for(50), Grade::D);
        assert_eq!(grade_for(49), Grade::E);
        assert_eq!(grade_for(0), Grade::E);
    }

    #[test]
    fn every_grade_has_its_own_template() {
        let mut seen = std::collections::HashSet::new();
        for grade in Grade::ALL {
            let text = feedback(grade, "Character 1");
            assert!(text.contains("Character 1"), "{grade}: {text}");
            assert!(!text.contains(NAME_SLOT));
            assert!(seen.insert(text), "{grade} shares a template");
        }
    }

    #[test]
    fn feedback_is_pure() {
        for grade in Grade::ALL {
            assert_eq!(feedback(grade, "ピカチュウ"), feedback(grade, "ピカチュウ"));
        }
    }
}
