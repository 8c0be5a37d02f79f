//! Action parser.
//!
//! Each line is tried against two forms, in order:
//!
//! 1. `verb(argument)` – the argument is the parenthesised text, trimmed.
//! 2. `verb argument` – the argument is everything after the first token.
//!
//! Script lines may carry an ordinal prefix (`"1. "`, `"2) "`) which is
//! stripped first.  Verbs match case-insensitively and ignore underscores;
//! arguments pass through unmodified apart from trimming.
//!
//! ```rust
//! use errand_runtime::parser::parse_script;
//! use errand_types::{Action, Verb};
//!
//! let plan = parse_script("1. move(desk_01)\n???\n2) pick laptop\n");
//! assert_eq!(plan, vec![
//!     Action::new(Verb::Move, "desk_01"),
//!     Action::new(Verb::Pick, "laptop"),
//! ]);
//! ```

use std::sync::LazyLock;

use errand_types::{Action, ErrandError, Verb};
use regex::Regex;
use tracing::warn;

static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\s*[.)]\s*").expect("ordinal regex must compile"));

static CALL_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]+)\s*\(\s*([^)]*?)\s*\)\s*$").expect("call regex must compile")
});

static WORD_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]+)\s+(.+?)\s*$").expect("word regex must compile"));

/// Parse a multi-line script.  Never fails: blank lines are ignored and
/// unrecognised lines are logged and skipped.
pub fn parse_script(text: &str) -> Vec<Action> {
    let mut actions = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = ORDINAL.replace(raw, "");
        match parse_line(&line) {
            Ok(Some(action)) => actions.push(action),
            Ok(None) => {}
            Err(e) => warn!(line_no = index + 1, error = %e, "skipping script line"),
        }
    }
    actions
}

/// Parse a single operator command.  No ordinal prefix is accepted.
///
/// # Errors
///
/// Returns [`ErrandError::Parse`] for blank input, a line matching neither
/// form, or an unknown verb.
pub fn parse_command(line: &str) -> Result<Action, ErrandError> {
    parse_line(line)?.ok_or_else(|| ErrandError::Parse {
        line: line.to_string(),
        reason: "empty command".into(),
    })
}

/// Parse one line with any ordinal already removed.  `Ok(None)` for blank
/// lines.
pub fn parse_line(line: &str) -> Result<Option<Action>, ErrandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let captures = CALL_FORM
        .captures(trimmed)
        .or_else(|| WORD_FORM.captures(trimmed))
        .ok_or_else(|| ErrandError::Parse {
            line: trimmed.to_string(),
            reason: "expected 'verb(argument)' or 'verb argument'".into(),
        })?;

    let token = &captures[1];
    let argument = captures[2].trim();
    let verb = Verb::from_token(token).ok_or_else(|| ErrandError::Parse {
        line: trimmed.to_string(),
        reason: format!("unknown verb '{token}'"),
    })?;
    if argument.is_empty() {
        return Err(ErrandError::Parse {
            line: trimmed.to_string(),
            reason: "missing argument".into(),
        });
    }
    Ok(Some(Action::new(verb, argument)))
}
