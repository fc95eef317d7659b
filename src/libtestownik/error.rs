use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot decode image")]
    ImageDecode(#[from] image::ImageError),
    #[error("cannot read or write file")]
    Io(#[from] io::Error),
    #[error("broken archive")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed JSON")]
    Json(#[from] serde_json::Error),
    #[error("cannot load font")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("`{0}` must be filled in before asking the model for answers")]
    Config(&'static str),
    #[error("model response must contain exactly one ``` fenced block, found {0} fence markers")]
    MalformedResponse(usize),
    #[error("chat completion request failed")]
    Api(#[from] async_openai::error::OpenAIError),
    #[error("no question with id {0}")]
    NoQuestion(u32),
    #[error("question {0} has no answers to seed the request with")]
    NoAnswers(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
