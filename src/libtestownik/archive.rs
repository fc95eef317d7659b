use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::libtestownik::document::{Answer, Document, Question};
use crate::libtestownik::error::Result;
use crate::libtestownik::overlay::Annotator;

const IMG_CLOSE: &str = "[/img]";
const IMAGE_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".gif"];

/// Entries land under a top-level folder named after the archive file.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.split('.').next().unwrap_or(name))
        .unwrap_or_default()
        .to_string()
}

macro_rules! id_or_continue {
    ($name:expr) => {
        match entry_id($name) {
            Some(id) => id,
            None => {
                warn!("[Archive] `{}` is not named after a question id, skipping.", $name);
                continue;
            }
        }
    };
}

/// Writes the whole document as a Testownik archive. The archive is staged
/// next to the destination and renamed into place once every entry is written,
/// so a failure partway through never leaves a truncated file behind.
pub fn export(doc: &Document, annotator: &Annotator, path: &Path) -> Result<()> {
    let staging = path.with_extension("zip.part");
    match write_entries(doc, annotator, &base_name(path), &staging) {
        Ok(written) => {
            fs::rename(&staging, path)?;
            debug!("[Archive] Wrote {} questions to {:?}.", written, path);
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&staging);
            Err(err)
        }
    }
}

fn write_entries(
    doc: &Document,
    annotator: &Annotator,
    folder: &str,
    staging: &Path,
) -> Result<usize> {
    let mut writer = ZipWriter::new(File::create(staging)?);
    let options = SimpleFileOptions::default();
    let mut written = 0;

    for question in doc.list() {
        if question.is_incomplete() {
            debug!("[Archive] Question {} is incomplete, skipping.", question.id);
            continue;
        }

        let mut image_name = String::new();
        if let Some(image) = &question.image {
            image_name = format!("{}.png", question.id);
            let stored = if question.text.trim().is_empty() {
                image.clone()
            } else {
                annotator.add_text_overlay(image, &question.text)
            };
            let mut bytes = Vec::new();
            stored.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
            writer.start_file(format!("{}/{}", folder, image_name), options)?;
            writer.write_all(&bytes)?;
        }

        writer.start_file(format!("{}/{}.txt", folder, question.id), options)?;
        writer.write_all(entry_text(question, &image_name).as_bytes())?;
        written += 1;
    }

    writer.finish()?;
    Ok(written)
}

/// The text entry the downstream quiz player reads: an `X`-prefixed
/// correctness bitmask over the non-blank answers, the question text, then one
/// answer per line. Blank answers are absent from both the mask and the body.
fn entry_text(question: &Question, image_name: &str) -> String {
    let filled: Vec<&Answer> = question.filled_answers().collect();

    let mut content = String::from("X");
    for answer in &filled {
        content.push(if answer.correct { '1' } else { '0' });
    }
    content.push('\n');

    if image_name.is_empty() {
        content.push_str(&question.text);
    } else {
        content.push_str(&format!("[img]{}{} {}", image_name, IMG_CLOSE, question.text));
    }
    content.push('\n');

    for answer in &filled {
        content.push_str(&answer.text);
        content.push('\n');
    }
    content
}

/// Reads an archive back and replaces the document with its contents.
///
/// Import is deliberately forgiving: an entry that is not named after a
/// numeric id, or whose body has fewer than 3 lines, is skipped with a warning
/// and the rest of the archive still loads. Undecodable image bytes drop the
/// image but keep the question.
pub fn import(doc: &mut Document, annotator: &Annotator, path: &Path) -> Result<()> {
    let mut reader = ZipArchive::new(File::open(path)?)?;
    let mut questions: BTreeMap<u32, Question> = BTreeMap::new();

    // Text entries first: image recovery needs the question text.
    for index in 0..reader.len() {
        let mut entry = reader.by_index(index)?;
        let name = entry.name().to_string();
        if !name.to_lowercase().ends_with(".txt") {
            continue;
        }
        let id = id_or_continue!(&name);
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        match parse_entry(id, &decode_text(&bytes)) {
            Some(question) => {
                questions.insert(id, question);
            }
            None => warn!("[Archive] `{}` has fewer than 3 lines, skipping.", name),
        }
    }

    for index in 0..reader.len() {
        let mut entry = reader.by_index(index)?;
        let name = entry.name().to_string();
        let lower = name.to_lowercase();
        if !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            continue;
        }
        let id = id_or_continue!(&name);
        let Some(question) = questions.get_mut(&id) else {
            warn!("[Archive] `{}` has no matching question, skipping.", name);
            continue;
        };
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        match image::load_from_memory(&bytes) {
            Ok(image) => {
                question.image = Some(if question.text.trim().is_empty() {
                    image
                } else {
                    annotator.remove_text_overlay(&image, &question.text)
                });
            }
            Err(err) => warn!(
                "[Archive] Cannot decode `{}`, question {} keeps no image: {}",
                name, id, err
            ),
        }
    }

    debug!("[Archive] Read {} questions from {:?}.", questions.len(), path);
    doc.replace(questions.into_values().collect());
    Ok(())
}

fn entry_id(name: &str) -> Option<u32> {
    Path::new(name).file_stem()?.to_str()?.parse().ok()
}

/// UTF-8, then the windows-1250 code page older archives were written in, then
/// latin-1. Every byte maps in latin-1, so the cascade cannot fail; bytes that
/// are invalid UTF-8 are always attributed to windows-1250 first.
fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1250.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_entry(id: u32, body: &str) -> Option<Question> {
    let lines: Vec<&str> = body.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    if lines.len() < 3 {
        return None;
    }

    let flags: Vec<bool> = match lines[0].strip_prefix('X') {
        Some(rest) => rest
            .chars()
            .filter(|c| c.is_ascii_digit())
            .map(|c| c == '1')
            .collect(),
        // no bitmask line, every answer defaults to incorrect
        None => Vec::new(),
    };

    let text = match lines[1].rfind(IMG_CLOSE) {
        Some(at) => lines[1][at + IMG_CLOSE.len()..].trim_start(),
        None => lines[1],
    }
    .to_string();

    let mut answers = Vec::new();
    for line in &lines[2..] {
        if line.trim().is_empty() {
            continue;
        }
        let correct = flags.get(answers.len()).copied().unwrap_or(false);
        answers.push(Answer::new(*line, correct));
    }

    Some(Question {
        id,
        text,
        answers,
        image: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn question(id: u32, text: &str, answers: Vec<Answer>) -> Question {
        Question {
            id,
            text: text.into(),
            answers,
            image: None,
        }
    }

    #[test]
    fn bitmask_covers_non_blank_answers_in_order() {
        let q = question(
            1,
            "What is 2+2?",
            vec![
                Answer::new("3", false),
                Answer::new("4", true),
                Answer::new("5", false),
            ],
        );
        let body = entry_text(&q, "");
        assert_eq!(body.split('\n').next(), Some("X010"));
    }

    #[test]
    fn blank_answers_vanish_from_mask_and_body() {
        let q = question(
            2,
            "Pick one",
            vec![
                Answer::new("yes", true),
                Answer::new("   ", false),
                Answer::new("no", false),
            ],
        );
        let body = entry_text(&q, "");
        assert_eq!(body, "X10\nPick one\nyes\nno\n");
    }

    #[test]
    fn image_marker_prefixes_the_question_line() {
        let q = question(7, "Name this flag", vec![Answer::new("Poland", true)]);
        let body = entry_text(&q, "7.png");
        assert_eq!(body.split('\n').nth(1), Some("[img]7.png[/img] Name this flag"));
    }

    #[test]
    fn parse_skips_short_bodies() {
        assert!(parse_entry(1, "X1\nonly two lines").is_none());
        assert!(parse_entry(1, "").is_none());
    }

    #[test]
    fn parse_without_bitmask_defaults_to_incorrect() {
        let q = parse_entry(4, "not a mask\nQuestion?\na\nb\n").unwrap();
        assert_eq!(q.answers.len(), 2);
        assert!(q.answers.iter().all(|a| !a.correct));
    }

    #[test]
    fn parse_strips_everything_up_to_the_last_img_marker() {
        let q = parse_entry(5, "X1\n[img]a.png[/img][img]5.png[/img] Real text\nyes\n").unwrap();
        assert_eq!(q.text, "Real text");
    }

    #[test]
    fn parse_aligns_flags_with_answer_ordinals() {
        let q = parse_entry(6, "X010\nWhat is 2+2?\n3\n4\n5\n").unwrap();
        let flags: Vec<bool> = q.answers.iter().map(|a| a.correct).collect();
        assert_eq!(flags, vec![false, true, false]);
        // an answer past the end of the mask defaults to incorrect
        let q = parse_entry(6, "X1\nWhat is 2+2?\n4\n5\n").unwrap();
        assert_eq!(
            q.answers.iter().map(|a| a.correct).collect::<Vec<_>>(),
            vec![true, false]
        );
    }

    #[test]
    fn decode_falls_back_to_windows_1250() {
        // "ą" is 0xB1 in windows-1250 and invalid UTF-8 on its own
        assert_eq!(decode_text(&[0xB1]), "ą");
        assert_eq!(decode_text("zażółć".as_bytes()), "zażółć");
    }

    #[test]
    fn entry_ids_parse_from_the_file_stem() {
        assert_eq!(entry_id("quiz/3.txt"), Some(3));
        assert_eq!(entry_id("quiz/12.png"), Some(12));
        assert_eq!(entry_id("quiz/readme.txt"), None);
    }

    #[test]
    fn round_trip_preserves_questions_answers_and_flags() {
        let mut doc = Document::new();
        doc.replace(vec![question(
            3,
            "What is 2+2?",
            vec![
                Answer::new("3", false),
                Answer::new("4", true),
                Answer::new("5", false),
            ],
        )]);

        let annotator = Annotator::new();
        let path = std::env::temp_dir().join("testownik-roundtrip-unit.zip");
        export(&doc, &annotator, &path).unwrap();

        let mut restored = Document::new();
        import(&mut restored, &annotator, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let q = restored.get(3).unwrap();
        assert_eq!(q.id, 3);
        assert_eq!(q.text, "What is 2+2?");
        assert_eq!(
            q.answers,
            vec![
                Answer::new("3", false),
                Answer::new("4", true),
                Answer::new("5", false),
            ]
        );
    }

    #[test]
    fn incomplete_questions_are_not_exported() {
        let mut doc = Document::new();
        doc.create();
        let full = doc.create();
        doc.update(full, "Real question", vec![Answer::new("yes", true)])
            .unwrap();

        let annotator = Annotator::new();
        let path = std::env::temp_dir().join("testownik-incomplete-unit.zip");
        export(&doc, &annotator, &path).unwrap();

        let mut restored = Document::new();
        import(&mut restored, &annotator, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(restored.len(), 1);
        assert!(restored.get(full).is_ok());
    }

    #[test]
    fn export_stages_and_renames_so_no_partial_file_survives() {
        let mut doc = Document::new();
        let id = doc.create();
        doc.update(id, "Q?", vec![Answer::new("a", true)]).unwrap();

        let dir = std::env::temp_dir().join("testownik-staging-unit");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.zip");
        export(&doc, &Annotator::new(), &path).unwrap();

        assert!(path.exists());
        assert!(!dir.join("out.zip.part").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn blank_text_with_image_round_trips_unannotated() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(450, 450, Rgb([10, 20, 30])));
        let mut doc = Document::new();
        let id = doc.create();
        doc.update(id, "", vec![Answer::new("a", true)]).unwrap();
        doc.set_image(id, image.clone()).unwrap();

        let annotator = Annotator::new();
        let path = std::env::temp_dir().join("testownik-blankimg-unit.zip");
        export(&doc, &annotator, &path).unwrap();

        let mut restored = Document::new();
        import(&mut restored, &annotator, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let q = restored.get(id).unwrap();
        let stored = q.image.as_ref().unwrap();
        assert_eq!(stored.to_rgb8().as_raw(), image.to_rgb8().as_raw());
    }
}
