//! Interactive folder prompt.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

pub const FIRST_PROMPT: &str = "Enter folder location: ";
pub const NEXT_PROMPT: &str = "Enter folder location to continue, or press Enter to exit: ";

/// Asks for folders until the user enters an empty line or input ends.
pub struct FolderPrompt<R, W> {
    input: R,
    output: W,
    asked: bool,
}

impl<R: BufRead, W: Write> FolderPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            asked: false,
        }
    }

    /// Use the follow-up prompt from now on, e.g. after a folder given on
    /// the command line.
    pub fn skip_first(&mut self) {
        self.asked = true;
    }

    /// The next folder to convert, or `None` when the user is done.
    pub fn next_folder(&mut self) -> io::Result<Option<PathBuf>> {
        let prompt = if self.asked { NEXT_PROMPT } else { FIRST_PROMPT };
        self.asked = true;

        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            // EOF: finish the prompt line so the shell prompt starts clean.
            writeln!(self.output)?;
            return Ok(None);
        }

        let folder = unquote(line.trim());
        if folder.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(folder)))
        }
    }
}

/// Explorer's "Copy as path" wraps paths in double quotes.
fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn prompt(input: &str) -> FolderPrompt<Cursor<Vec<u8>>, Vec<u8>> {
        FolderPrompt::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn transcript(p: &FolderPrompt<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(p.output.clone()).unwrap()
    }

    #[test]
    fn test_stops_on_empty_line() {
        let mut p = prompt("/data/march\n  /data/april  \n\n/never\n");
        assert_eq!(p.next_folder().unwrap(), Some(PathBuf::from("/data/march")));
        assert_eq!(p.next_folder().unwrap(), Some(PathBuf::from("/data/april")));
        assert_eq!(p.next_folder().unwrap(), None);
        assert_eq!(
            transcript(&p),
            format!("{FIRST_PROMPT}{NEXT_PROMPT}{NEXT_PROMPT}")
        );
    }

    #[test]
    fn test_stops_on_eof() {
        let mut p = prompt("/data/march");
        assert_eq!(p.next_folder().unwrap(), Some(PathBuf::from("/data/march")));
        assert_eq!(p.next_folder().unwrap(), None);
    }

    #[test]
    fn test_whitespace_only_counts_as_empty() {
        let mut p = prompt("   \t\r\n");
        assert_eq!(p.next_folder().unwrap(), None);
    }

    #[test]
    fn test_quoted_path() {
        let mut p = prompt("\"C:\\Users\\ana\\Monthly Reports\"\r\n");
        assert_eq!(
            p.next_folder().unwrap(),
            Some(PathBuf::from(r"C:\Users\ana\Monthly Reports"))
        );
    }

    #[test]
    fn test_skip_first_uses_follow_up_prompt() {
        let mut p = prompt("\n");
        p.skip_first();
        assert_eq!(p.next_folder().unwrap(), None);
        assert_eq!(transcript(&p), NEXT_PROMPT);
    }
}
