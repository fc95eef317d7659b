use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use log::{debug, error, warn};
use std::fs;
use std::path::PathBuf;

use testownik_creator::libtestownik::archive;
use testownik_creator::libtestownik::config::LlmConfig;
use testownik_creator::libtestownik::distractor::{apply_distractors, DistractorClient};
use testownik_creator::libtestownik::document::Document;
use testownik_creator::libtestownik::duplicates::{find_similar, severity_color};
use testownik_creator::libtestownik::error::{Error, Result};
use testownik_creator::libtestownik::overlay::Annotator;
use testownik_creator::libtestownik::quiz_json;

#[derive(Parser, Debug)]
#[command(name = "Testownik Creator")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "info")]
    log_level: String,
    /// TTF/OTF used when painting question text onto images.
    #[arg(short, long, value_name = "FILE")]
    font: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Re-encode an archive, normalizing entries and recomposing image overlays.
    Repack { input: PathBuf, output: PathBuf },
    /// Export an archive to the quiz player's JSON format.
    Json { input: PathBuf, output: PathBuf },
    /// List questions similar to the given one.
    Similar { input: PathBuf, id: u32 },
    /// Ask the configured model for wrong answers and append them to a question.
    Distract {
        input: PathBuf,
        id: u32,
        #[arg(short, long, value_name = "FILE", default_value = "config.json")]
        config: PathBuf,
        /// Send the whole answer list instead of just the correct answer.
        #[arg(long)]
        answers_context: bool,
    },
}

const FONT_CANDIDATES: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn annotator(font: Option<&PathBuf>) -> Annotator {
    let candidates = font
        .into_iter()
        .cloned()
        .chain(FONT_CANDIDATES.into_iter().map(PathBuf::from));
    for path in candidates {
        match fs::read(&path) {
            Ok(bytes) => match Annotator::with_font(bytes) {
                Ok(annotator) => {
                    debug!("[Overlay] Using font {:?}.", path);
                    return annotator;
                }
                Err(err) => warn!("[Overlay] {:?} is not a usable font: {}", path, err),
            },
            Err(_) => continue,
        }
    }
    warn!("[Overlay] No font found, image text bands will stay empty.");
    Annotator::new()
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    if let Err(err) = run(&args).await {
        error!("{}", format!("{}", err).red());
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<()> {
    let annotator = annotator(args.font.as_ref());

    match &args.command {
        Commands::Repack { input, output } => {
            let mut doc = Document::new();
            archive::import(&mut doc, &annotator, input)?;
            archive::export(&doc, &annotator, output)?;
            println!(
                "{}",
                format!("Repacked {} questions into {:?}.", doc.len(), output).green()
            );
        }
        Commands::Json { input, output } => {
            let mut doc = Document::new();
            archive::import(&mut doc, &annotator, input)?;
            quiz_json::export(&doc, output)?;
            println!(
                "{}",
                format!("Exported {} questions to {:?}.", doc.len(), output).green()
            );
        }
        Commands::Similar { input, id } => {
            let mut doc = Document::new();
            archive::import(&mut doc, &annotator, input)?;
            let question = doc.get(*id)?;
            let matches = find_similar(&question.text, *id, &doc);
            if matches.is_empty() {
                println!("{}", "No similar questions.".green());
            }
            for found in matches {
                let (r, g, b) = severity_color(found.score);
                println!(
                    "{} {}",
                    format!("[{}] {:.2}", found.id, found.score).truecolor(r, g, b),
                    found.text
                );
            }
        }
        Commands::Distract {
            input,
            id,
            config,
            answers_context,
        } => {
            let mut doc = Document::new();
            archive::import(&mut doc, &annotator, input)?;

            let client = DistractorClient::new(&LlmConfig::load(config)?)?;
            let question = doc.get(*id)?;
            let distractors = if *answers_context {
                client
                    .generate_with_context(&question.text, &question.answers)
                    .await?
            } else {
                let seed = question
                    .answers
                    .iter()
                    .find(|answer| answer.correct && !answer.is_blank())
                    .or_else(|| question.filled_answers().next())
                    .ok_or(Error::NoAnswers(*id))?;
                client.generate(&question.text, &seed.text).await?
            };

            println!(
                "{}",
                format!("Model returned {} distractors.", distractors.len()).cyan()
            );
            apply_distractors(&mut doc, *id, distractors)?;
            archive::export(&doc, &annotator, input)?;
            println!(
                "{}",
                format!("Updated question {} in {:?}.", id, input).green()
            );
        }
    }
    Ok(())
}
