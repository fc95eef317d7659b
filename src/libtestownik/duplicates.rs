use similar::TextDiff;

use crate::libtestownik::document::Document;

/// Matches at or above this ratio are reported to the author.
pub const SIMILARITY_LIMIT: f32 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: u32,
    pub text: String,
    pub score: f32,
}

/// Case-folded longest-common-subsequence-block ratio in `[0, 1]`.
pub fn string_similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    TextDiff::from_chars(a.as_str(), b.as_str()).ratio()
}

/// Scores `candidate_text` against every other question and keeps the ones at
/// or above `SIMILARITY_LIMIT`, in question-set order (not by score). Linear in
/// the question count; rerun whenever a text changes.
pub fn find_similar(candidate_text: &str, candidate_id: u32, doc: &Document) -> Vec<Match> {
    doc.list()
        .filter(|question| question.id != candidate_id)
        .filter_map(|question| {
            let score = string_similarity(candidate_text, &question.text);
            (score >= SIMILARITY_LIMIT).then(|| Match {
                id: question.id,
                text: question.text.clone(),
                score,
            })
        })
        .collect()
}

/// Red for near-duplicates, shading towards green close to the threshold.
pub fn severity_color(score: f32) -> (u8, u8, u8) {
    let green = (255.0 * (0.9 - score.powi(6))).clamp(0.0, 255.0) as u8;
    (255, green, 0)
}
