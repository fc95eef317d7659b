use log::debug;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::libtestownik::archive::base_name;
use crate::libtestownik::document::Document;
use crate::libtestownik::error::Result;

/// Shown as the quiz description in the player. There is deliberately no
/// importer for this format; the archive is the round-trip surface.
pub const ATTRIBUTION: &str = "Created with Testownik Creator";

#[derive(Serialize, Debug)]
struct QuizJson {
    title: String,
    description: String,
    questions: Vec<QuestionJson>,
}

#[derive(Serialize, Debug)]
struct QuestionJson {
    question: String,
    answers: Vec<AnswerJson>,
    multiple: bool,
}

#[derive(Serialize, Debug)]
struct AnswerJson {
    answer: String,
    correct: bool,
}

/// Writes the document as the quiz player's JSON file, applying the same
/// incompleteness skip as the archive exporter. Staged and renamed like the
/// archive so a failed write cannot truncate an existing export.
pub fn export(doc: &Document, path: &Path) -> Result<()> {
    let quiz = build(doc, base_name(path));
    let staging = path.with_extension("json.part");
    match serde_json::to_string_pretty(&quiz)
        .map_err(Into::into)
        .and_then(|body| fs::write(&staging, body).map_err(Into::into))
    {
        Ok(()) => {
            fs::rename(&staging, path)?;
            debug!("[Json] Wrote {} questions to {:?}.", quiz.questions.len(), path);
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&staging);
            Err(err)
        }
    }
}

fn build(doc: &Document, title: String) -> QuizJson {
    let questions = doc
        .list()
        .filter(|question| !question.is_incomplete())
        .map(|question| {
            let answers: Vec<AnswerJson> = question
                .filled_answers()
                .map(|answer| AnswerJson {
                    answer: answer.text.clone(),
                    correct: answer.correct,
                })
                .collect();
            let multiple = answers.iter().filter(|a| a.correct).count() > 1;
            QuestionJson {
                question: question.text.clone(),
                answers,
                multiple,
            }
        })
        .collect();

    QuizJson {
        title,
        description: ATTRIBUTION.to_string(),
        questions,
    }
}
