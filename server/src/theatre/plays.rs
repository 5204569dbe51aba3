//! Loading the replay script.
//!
//! The script is tab-separated with exactly three fields per record:
//! `play <TAB> character <TAB> line`. Fields may be double-quoted to carry
//! tabs or newlines. Every play becomes an open stage owned by the
//! playwright; every distinct character becomes a member.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use super::Theatre;
use crate::stats::EventSender;
use crate::token::Token;

/// Member that owns every play stage.
pub const PLAYWRIGHT: &str = "Shakespeare";

const FIELDS_PER_RECORD: usize = 3;

#[derive(Debug, Error)]
pub enum PlaysError {
    #[error("could not read plays file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected 3 tab-separated fields, found {found}")]
    Malformed { line: u64, found: usize },
    #[error("line {line}: {source}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },
    #[error("no plays found in {0}")]
    Empty(String),
}

/// One line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speech {
    pub character: Token,
    pub text: String,
}

/// A play staged for replay.
#[derive(Debug, Clone)]
pub struct Play {
    pub title: String,
    pub stage: Token,
    pub lines: Vec<Speech>,
}

/// Populate `theatre` from script text and return the plays ordered by title.
///
/// `source` only labels errors.
pub fn parse_plays(input: &str, source: &str, theatre: &mut Theatre) -> Result<Vec<Play>, PlaysError> {
    let playwright = theatre.add_member(PLAYWRIGHT);
    let mut plays: BTreeMap<String, Play> = BTreeMap::new();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_bytes());

    for result in reader.records() {
        let record = result.map_err(|source| PlaysError::Csv {
            line: source.position().map(|p| p.line()).unwrap_or(0),
            source,
        })?;
        if record.len() != FIELDS_PER_RECORD {
            return Err(PlaysError::Malformed {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                found: record.len(),
            });
        }
        let (title, character, text) = (&record[0], &record[1], &record[2]);

        let character = theatre.add_member(character);
        let play = plays.entry(title.to_string()).or_insert_with(|| Play {
            title: title.to_string(),
            stage: theatre.create_open_stage(playwright, format!("Play: {}", title)),
            lines: Vec::new(),
        });
        play.lines.push(Speech {
            character,
            text: text.to_string(),
        });
    }

    if plays.is_empty() {
        return Err(PlaysError::Empty(source.to_string()));
    }
    Ok(plays.into_values().collect())
}

/// Read the script at `path` into a fresh theatre publishing onto `events`.
pub fn load_plays(path: &Path, events: EventSender) -> Result<(Theatre, Vec<Play>), PlaysError> {
    let label = path.display().to_string();
    let input = std::fs::read_to_string(path).map_err(|source| PlaysError::Io {
        path: label.clone(),
        source,
    })?;

    let mut theatre = Theatre::new(events);
    let plays = parse_plays(&input, &label, &mut theatre)?;
    Ok((theatre, plays))
}
