//! Point-query view of a single stage, answered on demand to one client.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ContentType, OpenContent, Theatre};
use crate::token::{NameToken, Token};

/// Owner name marking a stage as an onboarding stage.
pub const ONBOARDING_OWNER: &str = "aereum-onboarding";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenContentJson {
    pub author: NameToken,
    pub html: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenStageJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding: Option<String>,
    pub stage: NameToken,
    pub owner: NameToken,
    pub moderators: Vec<NameToken>,
    pub submittors: Vec<NameToken>,
    pub content: Vec<OpenContentJson>,
}

impl Theatre {
    /// Name/token pair for a member. Unknown members render as empty.
    pub fn name_token(&self, token: &Token) -> NameToken {
        match self.member(token) {
            Some(member) => NameToken::new(member.name.as_str(), token),
            None => NameToken::default(),
        }
    }

    /// Render a post as HTML, one paragraph per line, prefixed by its author.
    pub fn render_html(&self, content: &OpenContent) -> String {
        let Some(author) = self.member(&content.author) else {
            return String::new();
        };
        match content.content_type {
            ContentType::Text => content
                .content
                .split('\n')
                .map(|row| format!("<p>{}:{}</p>", escape_html(&author.name), escape_html(row)))
                .collect(),
        }
    }

    /// Full detail of the stage named by `hex_token`.
    ///
    /// Returns None for malformed or unknown tokens.
    pub fn stage_detail(&self, hex_token: &str) -> Option<OpenStageJson> {
        let token = Token::from_hex(hex_token)?;
        let stage = self.stages.get(&token)?;

        let owner = self.name_token(&stage.owner);
        let onboarding = (owner.name == ONBOARDING_OWNER).then(|| ONBOARDING_OWNER.to_string());

        Some(OpenStageJson {
            onboarding,
            stage: NameToken::new(stage.description.as_str(), &token),
            owner,
            moderators: self.sorted_name_tokens(stage.moderators.iter()),
            submittors: self.sorted_name_tokens(stage.submitters.iter()),
            content: stage
                .content
                .iter()
                .map(|post| OpenContentJson {
                    author: self.name_token(&post.author),
                    html: self.render_html(post),
                    timestamp: post.timestamp,
                })
                .collect(),
        })
    }

    fn sorted_name_tokens<'a>(&self, tokens: impl Iterator<Item = &'a Token>) -> Vec<NameToken> {
        let mut sorted: Vec<&Token> = tokens.collect();
        sorted.sort();
        sorted.into_iter().map(|t| self.name_token(t)).collect()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
