//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// A single line of an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` for `250-...` continuation lines.
    pub is_last: bool,
    pub message: String,
}

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Converts a reply other than `code` into `ClientError::SmtpError`.
    ///
    /// # Errors
    ///
    /// Returns the reply as an error when its code differs from `code`.
    pub fn expect_code(self, code: u16) -> Result<Self> {
        if self.code == code {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    #[must_use]
    pub fn into_error(self) -> ClientError {
        ClientError::SmtpError {
            message: self.message(),
            code: self.code,
        }
    }

    /// EHLO keywords, i.e. every line after the greeting line.
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().skip(1).map(String::as_str)
    }

    /// Returns `true` if an EHLO reply advertises `keyword` (case-insensitive).
    #[must_use]
    pub fn has_capability(&self, keyword: &str) -> bool {
        self.capabilities().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|kw| kw.eq_ignore_ascii_case(keyword))
        })
    }

    /// Parameters of an advertised EHLO keyword, e.g. the mechanisms of `AUTH`.
    #[must_use]
    pub fn capability_params(&self, keyword: &str) -> Vec<String> {
        self.capabilities()
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                words
                    .next()
                    .filter(|kw| kw.eq_ignore_ascii_case(keyword))
                    .map(|_| words.map(str::to_ascii_uppercase).collect::<Vec<_>>())
            })
            .flatten()
            .collect()
    }

    /// Parses a single response line (without its line terminator).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code = line
            .get(..3)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ClientError::ParseError(format!("Invalid status code in '{line}'")))?
            .parse::<u16>()
            .map_err(|e| ClientError::ParseError(e.to_string()))?;

        let (is_last, message) = match line.as_bytes().get(3) {
            None => (true, ""),
            Some(b' ') => (true, &line[4..]),
            Some(b'-') => (false, &line[4..]),
            Some(other) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*other)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: message.to_string(),
        })
    }

    /// Parses one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None` when the
    /// buffer does not yet hold a terminating line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(newline) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + newline];
            consumed += newline + 1;

            let text = std::str::from_utf8(raw)?.trim_end_matches('\r');
            if text.is_empty() {
                continue;
            }

            let line = Self::parse_line(text)?;
            match code {
                None => code = Some(line.code),
                Some(expected) if expected != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_single_line() {
        let line = ResponseLine {
            code: 220,
            is_last: true,
            message: "mail.example.com ESMTP".to_string(),
        };
        assert_eq!(
            Response::parse_line("220 mail.example.com ESMTP").unwrap(),
            line
        );
        assert!(Response::parse_line("250").unwrap().is_last);
    }

    #[test]
    fn test_parse_bad_lines() {
        assert!(Response::parse_line("25").is_err());
        assert!(Response::parse_line("abc OK").is_err());
        assert!(Response::parse_line("250_OK").is_err());
    }

    #[test]
    fn test_parse_multi_line_response() {
        let data = b"250-mail.example.com\r\n250-SIZE 10000000\r\n250 HELP\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mail.example.com", "SIZE 10000000", "HELP"]
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_leaves_trailing_reply() {
        let data = b"220 ready\r\n250 OK\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 220);
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_incomplete_response() {
        assert!(Response::parse_response(b"250-mail.example.com\r\n250-SIZE").unwrap().is_none());
        assert!(Response::parse_response(b"250 OK").unwrap().is_none());
    }

    #[test]
    fn test_mismatched_codes() {
        assert!(Response::parse_response(b"250-first\r\n251 second\r\n").is_err());
    }

    #[test]
    fn test_capabilities() {
        let response = Response::new(
            250,
            vec![
                "mx.example.com".to_string(),
                "PIPELINING".to_string(),
                "starttls".to_string(),
                "AUTH PLAIN login".to_string(),
            ],
        );

        assert!(response.has_capability("STARTTLS"));
        assert!(response.has_capability("auth"));
        assert!(!response.has_capability("mx.example.com"));
        assert_eq!(response.capability_params("AUTH"), vec!["PLAIN", "LOGIN"]);
        assert!(response.capability_params("SIZE").is_empty());
    }

    #[test]
    fn test_expectations() {
        let response = Response::new(550, vec!["No such user".to_string()]);

        assert!(!response.is_success());
        assert_eq!(response.clone().into_error().code(), Some(550));
        assert!(response.expect_code(550).is_ok());

        let ready = Response::new(220, vec!["ready".to_string()]);
        assert!(ready.is_success());
        assert_eq!(ready.expect_code(250).unwrap_err().code(), Some(220));
    }
}
