use crate::error::ClubError;
use dialoguer::Input;

/// What the operator has to type before a destructive command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPhrase {
    Exact(&'static str),
    CaseInsensitive(&'static str),
}

impl ConfirmationPhrase {
    pub fn text(&self) -> &'static str {
        match self {
            ConfirmationPhrase::Exact(text) | ConfirmationPhrase::CaseInsensitive(text) => text,
        }
    }
}

pub fn is_confirmed(answer: &str, phrase: ConfirmationPhrase) -> bool {
    let answer = answer.trim();
    match phrase {
        ConfirmationPhrase::Exact(text) => answer == text,
        ConfirmationPhrase::CaseInsensitive(text) => answer.eq_ignore_ascii_case(text),
    }
}

/// Asks on the terminal unless `assume_yes` is set.
pub fn confirm(
    prompt: &str,
    phrase: ConfirmationPhrase,
    assume_yes: bool,
) -> Result<bool, ClubError> {
    if assume_yes {
        return Ok(true);
    }
    let answer: String = Input::new()
        .with_prompt(format!("{prompt} Type '{}' to continue", phrase.text()))
        .allow_empty(true)
        .interact_text()
        .map_err(|err| ClubError::Prompt(err.to_string()))?;
    Ok(is_confirmed(&answer, phrase))
}
