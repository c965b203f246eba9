//! Prompt assembly and the seam toward a generative language model.
//!
//! The model itself is an external collaborator reached over the network,
//! which this crate does not do; callers plug a provider in behind
//! `ExplanationModel`. What lives here is everything that can be computed
//! locally: the prompts, and the session-scoped conversation log.

use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Builds the prompt asking the model to explain a saliency overlay for a
/// prediction. The overlay image itself is passed to the provider alongside
/// this text.
pub fn explanation_prompt(predicted_label: &str, confidence: f32) -> String {
    format!(
        "You are an expert neurologist. You are tasked with explaining a saliency map of a brain tumor MRI scan.\n\
         The saliency map was generated by a deep learning model that was trained to classify brain tumors\n\
         as either glioma, meningioma, pituitary, or no tumor.\n\
         \n\
         The saliency map highlights the regions of the image that the machine learning model is focusing on\n\
         to make the prediction.\n\
         \n\
         The deep learning model predicted the image to be of class '{}' with a confidence of {}%.\n\
         \n\
         In your response:\n\
         - Explain what regions of the brain the model is focusing on, based on the saliency map. Refer to the regions\n\
         \x20 highlighted in warm red and orange, those are the regions where the model is focusing on.\n\
         - Explain possible reasons why the model made the prediction it did.\n\
         - Don't mention anything like 'The saliency map highlights the regions the model is focusing on'\n\
         \x20 in your explanation.\n\
         - Keep your explanation to 4 sentences max.\n",
        predicted_label,
        confidence * 100.0
    )
}

/// Builds the contextual prompt for one chat turn: the prediction, the
/// explanation already shown to the user, and their follow-up question.
pub fn chat_prompt(
    predicted_label: &str,
    confidence: f32,
    explanation: &str,
    user_query: &str,
) -> String {
    format!(
        "You are an expert neurologist assisting with brain tumor MRI scans.\n\
         The model predicted the class '{}' with {:.2}% confidence.\n\
         The saliency map highlights regions in the uploaded image where the model focused to make its decision.\n\
         \n\
         The provided explanation is:\n\
         {}\n\
         \n\
         Based on this context, respond to the following user query:\n\
         {}\n",
        predicted_label,
        confidence * 100.0,
        explanation,
        user_query
    )
}

/// A synchronous generative-language-model provider.
///
/// `image_path` points at the persisted saliency composite when the prompt
/// refers to one; providers that cannot take image input may ignore it.
pub trait ExplanationModel {
    fn generate(&self, prompt: &str, image_path: Option<&Path>) -> Result<String, Error>;
}

/// The provider shipped by default: always fails with a typed error, since
/// reaching a real model requires network transport this crate does not
/// carry. Callers that have a transport implement `ExplanationModel`
/// themselves and pass it in.
#[derive(Debug, Default)]
pub struct DisabledExplanationModel;

impl ExplanationModel for DisabledExplanationModel {
    fn generate(&self, _prompt: &str, _image_path: Option<&Path>) -> Result<String, Error> {
        Err(Error::ExplanationUnavailable)
    }
}

/// Prediction context every chat turn is grounded in.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationContext<'a> {
    pub predicted_label: &'a str,
    pub confidence: f32,
    pub explanation: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Local>,
}

/// Append-only conversation log, scoped to one analysis session. Never
/// persisted and never shared across sessions.
#[derive(Debug)]
pub struct ChatSession {
    id: Uuid,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// One exchange: record the user's query, ask the model with the full
    /// analysis context, record and return the reply. The query stays in
    /// the log even when the provider fails, so a retry reads naturally.
    pub fn ask(
        &mut self,
        model: &dyn ExplanationModel,
        context: &ExplanationContext<'_>,
        query: &str,
    ) -> Result<String, Error> {
        self.push(Role::User, query);

        let prompt = chat_prompt(
            context.predicted_label,
            context.confidence,
            context.explanation,
            query,
        );
        let reply = model.generate(&prompt, None)?;

        self.push(Role::Assistant, &reply);
        Ok(reply)
    }

    fn push(&mut self, role: Role, content: &str) {
        self.messages.push(ChatMessage {
            role,
            content: content.to_string(),
            at: Local::now(),
        });
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedModel {
        reply: String,
    }

    impl ExplanationModel for ScriptedModel {
        fn generate(&self, prompt: &str, _image_path: Option<&Path>) -> Result<String, Error> {
            assert!(!prompt.is_empty());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn explanation_prompt_carries_prediction_and_confidence() {
        let prompt = explanation_prompt("Meningioma", 0.875);
        assert!(prompt.contains("'Meningioma'"));
        assert!(prompt.contains("87.5%"));
        assert!(prompt.contains("4 sentences max"));
    }

    #[test]
    fn chat_prompt_embeds_context_and_query() {
        let prompt = chat_prompt("Glioma", 0.9234, "Prior explanation.", "Is this operable?");
        assert!(prompt.contains("'Glioma'"));
        assert!(prompt.contains("92.34%"));
        assert!(prompt.contains("Prior explanation."));
        assert!(prompt.contains("Is this operable?"));
    }

    #[test]
    fn ask_appends_both_turns_in_order() {
        let mut session = ChatSession::new();
        let model = ScriptedModel {
            reply: "The highlighted region sits near the pituitary.".to_string(),
        };
        let context = ExplanationContext {
            predicted_label: "Pituitary",
            confidence: 0.8,
            explanation: "explanation",
        };

        let reply = session.ask(&model, &context, "Where is the tumor?").unwrap();

        assert_eq!(reply, "The highlighted region sits near the pituitary.");
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Where is the tumor?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, reply);
    }

    #[test]
    fn failed_turn_keeps_the_user_query_logged() {
        let mut session = ChatSession::new();
        let context = ExplanationContext {
            predicted_label: "No tumor",
            confidence: 0.99,
            explanation: "explanation",
        };

        let err = session
            .ask(&DisabledExplanationModel, &context, "Anything to worry about?")
            .unwrap_err();

        assert!(matches!(err, Error::ExplanationUnavailable));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);
    }

    #[test]
    fn chat_message_round_trips_through_json() {
        let message = ChatMessage {
            role: Role::Assistant,
            content: "hello".to_string(),
            at: Local::now(),
        };
        let json = serde_json::to_string(&message).unwrap();
        let decoded: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(message, decoded);
    }
}
