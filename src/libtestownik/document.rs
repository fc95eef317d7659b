use image::DynamicImage;
use log::debug;
use std::collections::BTreeMap;

use crate::libtestownik::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub correct: bool,
}

impl Answer {
    pub fn new(text: impl Into<String>, correct: bool) -> Answer {
        Answer {
            text: text.into(),
            correct,
        }
    }

    /// Blank answers are the editor's "next empty slot" and never serialize.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Question {
    pub id: u32,
    pub text: String,
    pub answers: Vec<Answer>,
    pub image: Option<DynamicImage>,
}

impl Question {
    pub fn filled_answers(&self) -> impl Iterator<Item = &Answer> {
        self.answers.iter().filter(|answer| !answer.is_blank())
    }

    /// Questions with next to no text, no image and no usable answers are
    /// editing leftovers and are skipped by both exporters.
    pub fn is_incomplete(&self) -> bool {
        self.text.chars().count() < 2
            && self.image.is_none()
            && self.filled_answers().next().is_none()
    }
}

/// What the editing surface is currently pointed at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditorState {
    #[default]
    Idle,
    Editing(u32),
}

/// The authoritative in-memory question set. Single-writer: callers serialize
/// edits, so there is no locking in here.
#[derive(Debug, Default)]
pub struct Document {
    questions: BTreeMap<u32, Question>,
    state: EditorState,
}

impl Document {
    pub fn new() -> Document {
        Document::default()
    }

    /// Installs an empty question under `max(existing ids) + 1` (or 1) and
    /// starts editing it.
    pub fn create(&mut self) -> u32 {
        let id = self.questions.keys().next_back().copied().unwrap_or(0) + 1;
        self.questions.insert(
            id,
            Question {
                id,
                text: String::new(),
                answers: Vec::new(),
                image: None,
            },
        );
        self.state = EditorState::Editing(id);
        debug!("[Doc] Created question {}.", id);
        id
    }

    pub fn select(&mut self, id: u32) -> Result<()> {
        if !self.questions.contains_key(&id) {
            return Err(Error::NoQuestion(id));
        }
        self.state = EditorState::Editing(id);
        Ok(())
    }

    pub fn update(&mut self, id: u32, text: impl Into<String>, answers: Vec<Answer>) -> Result<()> {
        let question = self.questions.get_mut(&id).ok_or(Error::NoQuestion(id))?;
        question.text = text.into();
        question.answers = answers;
        Ok(())
    }

    pub fn set_image(&mut self, id: u32, image: DynamicImage) -> Result<()> {
        let question = self.questions.get_mut(&id).ok_or(Error::NoQuestion(id))?;
        question.image = Some(image);
        Ok(())
    }

    pub fn clear_image(&mut self, id: u32) -> Result<()> {
        let question = self.questions.get_mut(&id).ok_or(Error::NoQuestion(id))?;
        question.image = None;
        Ok(())
    }

    /// Deletes `id` if present and points the editor at the largest remaining
    /// question. Removing the last question leaves the editor idle.
    pub fn remove(&mut self, id: u32) {
        self.questions.remove(&id);
        self.state = match self.questions.keys().next_back() {
            Some(last) => EditorState::Editing(*last),
            None => EditorState::Idle,
        };
        debug!("[Doc] Removed question {}, now at {}.", id, self.current_id());
    }

    pub fn get(&self, id: u32) -> Result<&Question> {
        self.questions.get(&id).ok_or(Error::NoQuestion(id))
    }

    pub fn get_mut(&mut self, id: u32) -> Result<&mut Question> {
        self.questions.get_mut(&id).ok_or(Error::NoQuestion(id))
    }

    pub fn list(&self) -> impl Iterator<Item = &Question> {
        self.questions.values()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    /// 0 while idle, mirroring the archive convention that ids start at 1.
    pub fn current_id(&self) -> u32 {
        match self.state {
            EditorState::Idle => 0,
            EditorState::Editing(id) => id,
        }
    }

    /// Replaces the whole question set, as an archive import does. No merge.
    pub fn replace(&mut self, questions: Vec<Question>) {
        self.questions = questions.into_iter().map(|q| (q.id, q)).collect();
        self.state = match self.questions.keys().next_back() {
            Some(last) => EditorState::Editing(*last),
            None => EditorState::Idle,
        };
        debug!("[Doc] Replaced question set, {} questions.", self.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_increasing_ids() {
        let mut doc = Document::new();
        assert_eq!(doc.create(), 1);
        assert_eq!(doc.create(), 2);
        doc.remove(1);
        // gaps stay, ids never get reused downward
        assert_eq!(doc.create(), 3);
        assert_eq!(doc.list().map(|q| q.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn remove_points_editor_at_largest_remaining() {
        let mut doc = Document::new();
        doc.create();
        doc.create();
        doc.create();
        doc.remove(3);
        assert_eq!(doc.state(), EditorState::Editing(2));
        doc.remove(1);
        assert_eq!(doc.current_id(), 2);
    }

    #[test]
    fn remove_last_question_goes_idle_with_current_zero() {
        let mut doc = Document::new();
        let id = doc.create();
        doc.remove(id);
        assert_eq!(doc.state(), EditorState::Idle);
        assert_eq!(doc.current_id(), 0);
        // removing from an empty set must not fail either
        doc.remove(42);
        assert_eq!(doc.current_id(), 0);
    }

    #[test]
    fn update_and_select_reject_unknown_ids() {
        let mut doc = Document::new();
        assert!(doc.select(7).is_err());
        assert!(doc.update(7, "?", Vec::new()).is_err());
        let id = doc.create();
        doc.update(id, "What is 2+2?", vec![Answer::new("4", true)])
            .unwrap();
        assert_eq!(doc.get(id).unwrap().text, "What is 2+2?");
    }

    #[test]
    fn incomplete_questions_need_text_image_and_answers_missing() {
        let blank = Question {
            id: 1,
            text: "?".into(),
            answers: vec![Answer::new("  ", false)],
            image: None,
        };
        assert!(blank.is_incomplete());

        let with_answer = Question {
            id: 2,
            text: String::new(),
            answers: vec![Answer::new("4", true)],
            image: None,
        };
        assert!(!with_answer.is_incomplete());

        let with_text = Question {
            id: 3,
            text: "ok".into(),
            answers: Vec::new(),
            image: None,
        };
        assert!(!with_text.is_incomplete());
    }

    #[test]
    fn replace_swaps_the_whole_set() {
        let mut doc = Document::new();
        doc.create();
        doc.create();
        doc.replace(vec![Question {
            id: 9,
            text: "imported".into(),
            answers: Vec::new(),
            image: None,
        }]);
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.current_id(), 9);
        doc.replace(Vec::new());
        assert_eq!(doc.current_id(), 0);
    }
}
