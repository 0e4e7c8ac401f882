//! Command input: one line at a time from the G-code file.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Pulls successive lines from any buffered reader, tracking a 1-based line
/// number for diagnostics.
///
/// End-of-input is an explicit `Ok(None)`; an empty line is `Ok(Some(""))`.
/// The two are never conflated.
#[derive(Debug)]
pub struct CommandSource<R> {
    reader: R,
    line: String,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin> CommandSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
        }
    }

    /// Line number of the most recently returned line.
    pub fn line_number(&self) -> u64 {
        self.line_no
    }

    /// Next line with the terminator (and a trailing `\r`, for CRLF files)
    /// stripped. Whitespace is otherwise preserved; trimming is the
    /// caller's decision.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.line.clear();
        let bytes = self.reader.read_line(&mut self.line).await?;
        if bytes == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        let mut line = self.line.as_str();
        if let Some(stripped) = line.strip_suffix('\n') {
            line = stripped;
        }
        if let Some(stripped) = line.strip_suffix('\r') {
            line = stripped;
        }
        Ok(Some(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn source(data: &'static [u8]) -> CommandSource<BufReader<&'static [u8]>> {
        CommandSource::new(BufReader::new(data))
    }

    #[tokio::test]
    async fn strips_lf_and_crlf_terminators() {
        let mut src = source(b"G1 X1\r\nG1 X2\n");
        assert_eq!(src.next_line().await.unwrap().as_deref(), Some("G1 X1"));
        assert_eq!(src.next_line().await.unwrap().as_deref(), Some("G1 X2"));
        assert_eq!(src.next_line().await.unwrap(), None);
        assert_eq!(src.line_number(), 2);
    }

    #[tokio::test]
    async fn final_line_without_terminator_is_returned() {
        let mut src = source(b"G28");
        assert_eq!(src.next_line().await.unwrap().as_deref(), Some("G28"));
        assert_eq!(src.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_line_is_distinct_from_end_of_input() {
        let mut src = source(b"\n");
        assert_eq!(src.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(src.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn interior_whitespace_is_preserved() {
        let mut src = source(b"  G1 X10  \n");
        assert_eq!(src.next_line().await.unwrap().as_deref(), Some("  G1 X10  "));
    }
}
