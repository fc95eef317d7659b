use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use log::{debug, warn};

use crate::libtestownik::config::LlmConfig;
use crate::libtestownik::document::{Answer, Document};
use crate::libtestownik::error::{Error, Result};

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1000;
const FENCE: &str = "```";

/// How the request frames the existing answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// One known-correct answer is shown; new answers come back as `- ` lines.
    SingleCorrect,
    /// The full answer list is shown as `[v] `/`[x] ` lines; new distractors
    /// come back as `[x] ` lines.
    AnswersContext,
}

impl RequestKind {
    fn marker(self) -> &'static str {
        match self {
            RequestKind::SingleCorrect => "- ",
            RequestKind::AnswersContext => "[x] ",
        }
    }
}

/// Asks a chat-completion endpoint for wrong answers ("distractors") to pad a
/// question with. One request is one single-shot async call with one terminal
/// result; there is no retry, no cancellation and no timeout beyond the
/// transport's own.
pub struct DistractorClient {
    client: Client<OpenAIConfig>,
    model: String,
    count: u32,
}

impl DistractorClient {
    /// Fails before any network I/O when the endpoint config is incomplete.
    pub fn new(config: &LlmConfig) -> Result<DistractorClient> {
        config.validate()?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.key)
            .with_api_base(&config.url);
        Ok(DistractorClient {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            count: config.count,
        })
    }

    /// `RequestKind::SingleCorrect`: one correct answer seeds the request.
    pub async fn generate(&self, question: &str, correct_answer: &str) -> Result<Vec<String>> {
        let system = format!(
            "You are a helpful assistant helping user to create a quiz. \
             Respond in the same language as the user's question. \
             User will provide to you quiz question and a correct answer. \
             Provide a list of incorrect answers to fill into the quiz. \
             Format your answers as a list of items, each starting with \"- \", \
             and enclose all answers within triple backticks (```). \
             Generate {} new answers",
            self.count
        );
        let user = format!("# {}\n\n```\n- {}\n```\n", question, correct_answer);
        let content = self.send(&system, &user).await?;
        parse_fenced(&content, RequestKind::SingleCorrect.marker())
    }

    /// `RequestKind::AnswersContext`: the existing correct/incorrect answers
    /// are all shown, so the model can avoid near-duplicates.
    pub async fn generate_with_context(
        &self,
        question: &str,
        answers: &[Answer],
    ) -> Result<Vec<String>> {
        let system = format!(
            "You are a helpful assistant helping user to create a quiz. \
             Respond in the same language as the user's question. \
             User will provide a quiz question and its current answers, \
             marked \"[v] \" when correct and \"[x] \" when incorrect. \
             Provide {} new incorrect answers that are distinct from the \
             existing ones, each on its own line starting with \"[x] \", \
             and enclose all of them within triple backticks (```).",
            self.count
        );
        let mut listing = String::new();
        for answer in answers.iter().filter(|a| !a.is_blank()) {
            listing.push_str(if answer.correct { "[v] " } else { "[x] " });
            listing.push_str(&answer.text);
            listing.push('\n');
        }
        let user = format!("# {}\n\n```\n{}```\n", question, listing);
        let content = self.send(&system, &user).await?;
        parse_fenced(&content, RequestKind::AnswersContext.marker())
    }

    async fn send(&self, system: &str, user: &str) -> Result<String> {
        debug!("[LLM] Requesting completion from model {}.", self.model);
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()?,
            ),
        ];
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|err| {
            warn!("[LLM] Request failed: {}", err);
            Error::Api(err)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();
        debug!("[LLM] Got {} characters back.", content.len());
        Ok(content.trim().to_string())
    }
}

/// Pulls answers out of the single fenced block the prompt asked for. Any
/// fence-marker count other than exactly 2 is a protocol error; an empty list
/// inside a well-formed block is fine.
pub fn parse_fenced(content: &str, marker: &str) -> Result<Vec<String>> {
    let fences = content.matches(FENCE).count();
    if fences != 2 {
        return Err(Error::MalformedResponse(fences));
    }
    let inner = content.split(FENCE).nth(1).unwrap_or_default();

    let mut answers = Vec::new();
    for line in inner.split('\n') {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(marker) {
            answers.push(rest.trim().trim_matches('"').to_string());
        }
    }
    Ok(answers)
}

/// Appends freshly generated distractors to a question as incorrect answers.
/// When the question has no correct answer yet, its first answer is promoted
/// before anything is appended.
pub fn apply_distractors(doc: &mut Document, id: u32, distractors: Vec<String>) -> Result<()> {
    let question = doc.get_mut(id)?;
    if !question.answers.iter().any(|answer| answer.correct) {
        if let Some(first) = question.answers.first_mut() {
            first.correct = true;
        }
    }
    question
        .answers
        .extend(distractors.into_iter().map(|text| Answer::new(text, false)));
    Ok(())
}
