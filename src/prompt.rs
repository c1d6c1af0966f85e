use crate::error::{AppError, Result};
use std::io::{BufRead, Write};

/// Asks `question` until the answer is yes or no.
pub fn yes_no<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, question: &str) -> Result<bool> {
    loop {
        write!(writer, "{} (y/n) ", question)?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(AppError::InvalidInput("no answer given".to_string()));
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(writer, "Please answer y or n.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn accepts_short_and_long_answers() {
        for (input, expected) in [("y\n", true), ("YES\n", true), ("n\n", false), ("no\n", false)] {
            let mut out = Vec::new();
            let answer = yes_no(&mut Cursor::new(input), &mut out, "Proceed?").unwrap();
            assert_eq!(answer, expected, "input {:?}", input);
        }
    }

    #[test]
    fn asks_again_on_unclear_answer() {
        let mut out = Vec::new();
        let answer = yes_no(&mut Cursor::new("maybe\ny\n"), &mut out, "Proceed?").unwrap();
        assert!(answer);
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Proceed? (y/n)").count(), 2);
        assert!(out.contains("Please answer y or n."));
    }

    #[test]
    fn end_of_input_is_an_error() {
        let mut out = Vec::new();
        assert!(yes_no(&mut Cursor::new(""), &mut out, "Proceed?").is_err());
    }
}
