use crate::JudgeError;
use std::fmt;

/// Answer of the judge that neither video is preferred.
pub const EQUALLY_PREFERRED: &str = "Equally preferred";

/// The answer starts with `<Answer>: Video <N>`; the label is read from this prefix.
const ANSWER_PREFIX_LEN: usize = 17;

/// Preference between two videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgement {
    /// The first video is preferred.
    First,

    /// The second video is preferred.
    Second,

    /// Neither video is preferred.
    Tie,
}

impl Judgement {
    /// Preference label: `0` for the first video, `1` for the second and `-1` for a
    /// tie.
    pub fn to_label(self) -> i64 {
        match self {
            Self::First => 0,
            Self::Second => 1,
            Self::Tie => -1,
        }
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "Video 1"),
            Self::Second => write!(f, "Video 2"),
            Self::Tie => write!(f, "{}", EQUALLY_PREFERRED),
        }
    }
}

/// Parses an answer of the form `<Answer>: Video <N>`.
///
/// Only the first 17 characters are read for the video index, so text after it
/// is ignored. The answer is a tie when the slot after the first `:` of the
/// first line reads `Equally preferred`. Anything else is
/// [`JudgeError::MalformedResponse`].
pub fn parse_judgement(text: &str) -> Result<Judgement, JudgeError> {
    let malformed = || JudgeError::MalformedResponse(text.to_string());

    let answer = text
        .lines()
        .next()
        .and_then(|line| line.split_once(':'))
        .map(|(_, slot)| slot.trim())
        .ok_or_else(malformed)?;
    if answer.starts_with(EQUALLY_PREFERRED) {
        return Ok(Judgement::Tie);
    }

    let head: String = text.chars().take(ANSWER_PREFIX_LEN).collect();
    let index = head
        .split(':')
        .nth(1)
        .and_then(|s| s.trim().split(' ').last())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(malformed)?;
    match index {
        1 => Ok(Judgement::First),
        2 => Ok(Judgement::Second),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_judgement() {
        assert_eq!(parse_judgement("<Answer>: Video 1").unwrap(), Judgement::First);
        assert_eq!(
            parse_judgement("<Answer>: Video 2\nThe robot in video 2 walks.").unwrap(),
            Judgement::Second
        );
        assert_eq!(
            parse_judgement("<Answer>: Equally preferred").unwrap(),
            Judgement::Tie
        );
        assert_eq!(
            parse_judgement(
                "<Answer>: Video 2\nThe videos are not equally preferred; \
                 Equally preferred would be wrong here."
            )
            .unwrap(),
            Judgement::Second
        );
    }

    #[test]
    fn test_malformed_is_not_a_tie() {
        for text in [
            "",
            "Video 1",
            "<Answer>: Video one",
            "<Answer>: Video 3",
            "I think Equally preferred.",
        ] {
            assert!(matches!(
                parse_judgement(text),
                Err(JudgeError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn test_to_label() {
        assert_eq!(Judgement::First.to_label(), 0);
        assert_eq!(Judgement::Second.to_label(), 1);
        assert_eq!(Judgement::Tie.to_label(), -1);
    }
}
