//! Shared entity state: members, stages and the content published on them.
//!
//! Members are fixed once the repertoire is loaded. Stages live in a DashMap
//! because the replay producer appends content while connection actors read
//! stage details concurrently.

pub mod detail;
pub mod plays;
pub mod replay;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};

use crate::stats::{ActivityEvent, EventSender};
use crate::token::Token;

pub use detail::{OpenContentJson, OpenStageJson};
pub use plays::{load_plays, parse_plays, Play, PlaysError, Speech};
pub use replay::spawn_replay;

/// A registered member (actor) of the theatre.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
}

/// Kind of payload carried by a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
}

/// One post on a stage.
#[derive(Debug, Clone)]
pub struct OpenContent {
    pub author: Token,
    pub content_type: ContentType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl OpenContent {
    /// A text post stamped with the current time.
    pub fn text(author: Token, content: impl Into<String>) -> Self {
        Self {
            author,
            content_type: ContentType::Text,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A stage anyone may read. The owner starts as its only moderator and submitter.
#[derive(Debug, Clone)]
pub struct OpenStage {
    pub owner: Token,
    pub description: String,
    pub moderators: HashSet<Token>,
    pub submitters: HashSet<Token>,
    pub content: Vec<OpenContent>,
}

pub struct Theatre {
    members: HashMap<Token, Member>,
    names: HashMap<String, Token>,
    stages: DashMap<Token, OpenStage>,
    events: EventSender,
}

impl Theatre {
    /// Empty theatre publishing activity onto `events`.
    pub fn new(events: EventSender) -> Self {
        Self {
            members: HashMap::new(),
            names: HashMap::new(),
            stages: DashMap::new(),
            events,
        }
    }

    /// Register a member by name, returning the existing token if the name is taken.
    pub fn add_member(&mut self, name: &str) -> Token {
        if let Some(token) = self.names.get(name) {
            return *token;
        }
        let token = Token::random();
        self.names.insert(name.to_string(), token);
        self.members.insert(
            token,
            Member {
                name: name.to_string(),
            },
        );
        token
    }

    pub fn member(&self, token: &Token) -> Option<&Member> {
        self.members.get(token)
    }

    pub fn member_token(&self, name: &str) -> Option<Token> {
        self.names.get(name).copied()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Create an open stage owned by `owner` and return its token.
    pub fn create_open_stage(&self, owner: Token, description: impl Into<String>) -> Token {
        let token = Token::random();
        let stage = OpenStage {
            owner,
            description: description.into(),
            moderators: HashSet::from([owner]),
            submitters: HashSet::from([owner]),
            content: Vec::new(),
        };
        self.stages.insert(token, stage);
        token
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Number of posts on a stage, or None for an unknown stage.
    pub fn content_count(&self, stage: &Token) -> Option<usize> {
        self.stages.get(stage).map(|s| s.content.len())
    }

    /// Append `content` to a stage and report the activity.
    ///
    /// Returns false, leaving everything untouched, when the stage or the
    /// author is unknown.
    pub fn publish(&self, content: OpenContent, stage_token: Token) -> bool {
        let Some(author) = self.members.get(&content.author) else {
            return false;
        };
        let Some(mut stage) = self.stages.get_mut(&stage_token) else {
            return false;
        };

        let event = ActivityEvent {
            actor: content.author,
            actor_name: author.name.clone(),
            stage: stage_token,
            stage_name: stage.description.clone(),
            timestamp: content.timestamp,
        };
        stage.content.push(content);
        // Release the shard lock before touching the channel.
        drop(stage);

        if self.events.send(event).is_err() {
            tracing::debug!(stage = %stage_token, "Activity channel closed, event not counted");
        }
        true
    }
}
