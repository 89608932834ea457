//! Text command parsing for the line-oriented server.
//!
//! Commands arrive as single lines ("start 30 recording the demo") and
//! parse into a `UserCommand`. Parsing is forgiving: unknown verbs fall
//! back to `Help` rather than erroring, so a typo gets usage text instead
//! of silence.

use chrono::Duration;

/// One parsed user command.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Start a take, optionally with a target length and description.
    Start {
        target: Option<Duration>,
        description: Option<String>,
    },
    Pause,
    Resume,
    /// Stop the live take, optionally with notes.
    Stop { notes: Option<String> },
    Status,
    History,
    /// Report that the take's recording finished uploading.
    Uploaded { take_id: String },
    /// Approve an uploaded take with a reward multiplier.
    Approve { take_id: String, multiplier: f64 },
    /// Reject an uploaded take.
    Reject { take_id: String },
    /// List recently completed takes across all users (JSON response).
    Recent { limit: Option<usize> },
    Help,
}

impl UserCommand {
    /// Parses a raw command line.
    ///
    /// The verb is case-insensitive. For `start`, a leading integer is the
    /// target length in minutes and the rest is the description; for
    /// `stop`, everything after the verb is notes.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Self::Help;
        };

        match verb.to_ascii_lowercase().as_str() {
            "start" => {
                let rest: Vec<&str> = words.collect();
                let (target, description_words) = match rest.first().and_then(|w| w.parse::<i64>().ok()) {
                    Some(mins) if mins > 0 => (Some(Duration::minutes(mins)), &rest[1..]),
                    _ => (None, &rest[..]),
                };
                let description = non_empty(description_words.join(" "));
                Self::Start {
                    target,
                    description,
                }
            }
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop {
                notes: non_empty(words.collect::<Vec<_>>().join(" ")),
            },
            "status" => Self::Status,
            "history" => Self::History,
            "uploaded" => match words.next() {
                Some(id) => Self::Uploaded {
                    take_id: id.to_string(),
                },
                None => Self::Help,
            },
            "approve" => {
                let take_id = words.next();
                let multiplier = words.next().and_then(|w| w.parse::<f64>().ok());
                match (take_id, multiplier) {
                    (Some(id), Some(m)) => Self::Approve {
                        take_id: id.to_string(),
                        multiplier: m,
                    },
                    (Some(id), None) => Self::Approve {
                        take_id: id.to_string(),
                        multiplier: 1.0,
                    },
                    _ => Self::Help,
                }
            }
            "reject" => match words.next() {
                Some(id) => Self::Reject {
                    take_id: id.to_string(),
                },
                None => Self::Help,
            },
            "recent" => Self::Recent {
                limit: words.next().and_then(|w| w.parse::<usize>().ok()),
            },
            _ => Self::Help,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Usage text returned for `help` and unrecognized commands.
pub const USAGE: &str = "commands: start [minutes] [description], pause, resume, stop [notes], \
     status, history, uploaded <take-id>, approve <take-id> [multiplier], reject <take-id>, \
     recent [n], help";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_start() {
        assert_eq!(
            UserCommand::parse("start"),
            UserCommand::Start {
                target: None,
                description: None
            }
        );
    }

    #[test]
    fn test_parse_start_with_minutes_and_description() {
        assert_eq!(
            UserCommand::parse("start 30 recording the demo"),
            UserCommand::Start {
                target: Some(Duration::minutes(30)),
                description: Some("recording the demo".to_string())
            }
        );
    }

    #[test]
    fn test_parse_start_description_only() {
        // A non-numeric first word belongs to the description.
        assert_eq!(
            UserCommand::parse("start demo video"),
            UserCommand::Start {
                target: None,
                description: Some("demo video".to_string())
            }
        );
    }

    #[test]
    fn test_parse_start_rejects_nonpositive_minutes() {
        // Zero is not a usable target; it reads as description instead.
        assert_eq!(
            UserCommand::parse("start 0"),
            UserCommand::Start {
                target: None,
                description: Some("0".to_string())
            }
        );
    }

    #[test]
    fn test_parse_stop_with_notes() {
        assert_eq!(
            UserCommand::parse("stop finished the walkthrough"),
            UserCommand::Stop {
                notes: Some("finished the walkthrough".to_string())
            }
        );
        assert_eq!(UserCommand::parse("stop"), UserCommand::Stop { notes: None });
    }

    #[test]
    fn test_parse_simple_verbs_case_insensitive() {
        assert_eq!(UserCommand::parse("PAUSE"), UserCommand::Pause);
        assert_eq!(UserCommand::parse("Resume"), UserCommand::Resume);
        assert_eq!(UserCommand::parse("status"), UserCommand::Status);
        assert_eq!(UserCommand::parse("history"), UserCommand::History);
    }

    #[test]
    fn test_parse_review_verbs() {
        assert_eq!(
            UserCommand::parse("uploaded abc-123"),
            UserCommand::Uploaded {
                take_id: "abc-123".to_string()
            }
        );
        assert_eq!(
            UserCommand::parse("approve abc-123 2.0"),
            UserCommand::Approve {
                take_id: "abc-123".to_string(),
                multiplier: 2.0
            }
        );
        // Multiplier defaults to 1.0 when omitted.
        assert_eq!(
            UserCommand::parse("approve abc-123"),
            UserCommand::Approve {
                take_id: "abc-123".to_string(),
                multiplier: 1.0
            }
        );
        assert_eq!(
            UserCommand::parse("reject abc-123"),
            UserCommand::Reject {
                take_id: "abc-123".to_string()
            }
        );
        // Missing ids fall back to help.
        assert_eq!(UserCommand::parse("uploaded"), UserCommand::Help);
        assert_eq!(UserCommand::parse("approve"), UserCommand::Help);
    }

    #[test]
    fn test_parse_recent() {
        assert_eq!(
            UserCommand::parse("recent 10"),
            UserCommand::Recent { limit: Some(10) }
        );
        assert_eq!(
            UserCommand::parse("recent"),
            UserCommand::Recent { limit: None }
        );
    }

    #[test]
    fn test_unknown_and_empty_fall_back_to_help() {
        assert_eq!(UserCommand::parse("dance"), UserCommand::Help);
        assert_eq!(UserCommand::parse(""), UserCommand::Help);
        assert_eq!(UserCommand::parse("   "), UserCommand::Help);
    }
}
