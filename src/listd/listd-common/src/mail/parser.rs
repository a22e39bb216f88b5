/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
 */
use super::message::{Body, Mail, MailHeaders};

const MAX_DEPTH: usize = 32;

/// Error produced while parsing a raw message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// The input does not contain anything.
    #[error("the message is empty")]
    Empty,
    /// A line of the header section is neither a field nor a continuation.
    #[error("invalid header line: `{line}`")]
    InvalidHeader {
        /// the offending line
        line: String,
    },
    /// A `multipart/*` content type without a `boundary` parameter.
    #[error("multipart content without boundary")]
    MissingBoundary,
    /// Too many nested parts.
    #[error("message nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

impl Mail {
    /// Parse a raw RFC 5322 message, `\r\n` or `\n` separated.
    ///
    /// # Errors
    ///
    /// * see [`ParseError`]
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let normalized = input.replace("\r\n", "\n");
        if normalized.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        parse_at_depth(&normalized, 0)
    }
}

fn parse_headers(section: &str) -> Result<MailHeaders, ParseError> {
    let mut headers = Vec::<(String, String)>::new();

    for line in section.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| ParseError::InvalidHeader {
                    line: line.to_string(),
                })?;
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(line.trim());
            continue;
        }

        match line.split_once(':') {
            Some((name, value))
                if !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_ascii_graphic() && c != ':') =>
            {
                headers.push((name.to_string(), value.trim().to_string()));
            }
            _ => {
                return Err(ParseError::InvalidHeader {
                    line: line.to_string(),
                })
            }
        }
    }

    Ok(MailHeaders(headers))
}

fn parse_at_depth(input: &str, depth: usize) -> Result<Mail, ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep);
    }

    let (header_section, body) = if input.starts_with('\n') {
        ("", Some(&input[1..]))
    } else {
        match input.split_once("\n\n") {
            Some((headers, body)) => (headers, Some(body)),
            None => (input.trim_end_matches('\n'), None),
        }
    };

    let mut mail = Mail {
        headers: parse_headers(header_section)?,
        body: Body::Empty,
    };

    let body = match body {
        Some(body) => body,
        None => return Ok(mail),
    };

    let (content_type, params) = mail.content_type();
    mail.body = if content_type.starts_with("multipart/") {
        let boundary = params
            .into_iter()
            .find(|(k, _)| k == "boundary")
            .map(|(_, v)| v)
            .ok_or(ParseError::MissingBoundary)?;
        parse_multipart(body, boundary, depth)?
    } else if content_type == "message/rfc822" {
        parse_at_depth(body, depth + 1)
            .map(|inner| Body::Message(Box::new(inner)))
            .unwrap_or_else(|_| Body::Text(body.to_string()))
    } else {
        Body::Text(body.to_string())
    };

    Ok(mail)
}

fn parse_multipart(body: &str, boundary: String, depth: usize) -> Result<Body, ParseError> {
    let delimiter = format!("--{boundary}");
    let closing = format!("--{boundary}--");

    let mut preamble = vec![];
    let mut parts = vec![];
    let mut current: Option<Vec<&str>> = None;
    let mut epilogue = vec![];
    let mut closed = false;

    for line in body.lines() {
        if closed {
            epilogue.push(line);
            continue;
        }
        let trimmed = line.trim_end();
        if trimmed == closing {
            if let Some(lines) = current.take() {
                parts.push(lines);
            }
            closed = true;
        } else if trimmed == delimiter {
            if let Some(lines) = current.replace(vec![]) {
                parts.push(lines);
            }
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        } else {
            preamble.push(line);
        }
    }
    if let Some(lines) = current.take() {
        parts.push(lines);
    }

    let join = |lines: Vec<&str>| {
        if lines.is_empty() {
            String::new()
        } else {
            let mut out = lines.join("\n");
            out.push('\n');
            out
        }
    };

    Ok(Body::Multipart {
        boundary,
        preamble: join(preamble),
        parts: parts
            .into_iter()
            .map(|lines| {
                let raw = join(lines);
                if raw.trim().is_empty() {
                    Ok(Mail::default())
                } else {
                    parse_at_depth(&raw, depth + 1)
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
        epilogue: join(epilogue),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple() {
        let mail = Mail::parse(
            "From: john doe <john@doe>\r\nSubject: a very\r\n  long subject\r\n\r\nhello\r\nworld\r\n",
        )
        .unwrap();

        assert_eq!(mail.get_header("subject"), Some("a very long subject"));
        assert_eq!(mail.body, Body::Text("hello\nworld\n".to_string()));
    }

    #[test]
    fn headers_only() {
        let mail = Mail::parse("From: a@b\nTo: c@d\n").unwrap();
        assert_eq!(mail.headers.0.len(), 2);
        assert_eq!(mail.body, Body::Empty);
    }

    #[rstest::rstest]
    #[case("", ParseError::Empty)]
    #[case("not a header\n\nbody", ParseError::InvalidHeader { line: "not a header".to_string() })]
    #[case(" continuation\n\nbody", ParseError::InvalidHeader { line: " continuation".to_string() })]
    #[case("Content-Type: multipart/mixed\n\n--x\n", ParseError::MissingBoundary)]
    fn invalid(#[case] input: &str, #[case] expected: ParseError) {
        assert_eq!(Mail::parse(input).unwrap_err(), expected);
    }

    #[test]
    fn multipart_with_rfc822() {
        let raw = [
            "From: a@b\n",
            "Content-Type: multipart/mixed; boundary=\"b1\"\n",
            "\n",
            "preamble\n",
            "--b1\n",
            "Content-Type: text/plain\n",
            "\n",
            "first part\n",
            "--b1\n",
            "Content-Type: message/rfc822\n",
            "\n",
            "Subject: inner\n",
            "\n",
            "inner body\n",
            "--b1--\n",
            "epilogue\n",
        ]
        .concat();

        let mail = Mail::parse(&raw).unwrap();
        let parts = mail.parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].text_content(), Some("first part\n"));
        match &parts[1].body {
            Body::Message(inner) => assert_eq!(inner.subject(), Some("inner")),
            otherwise => panic!("unexpected body {otherwise:?}"),
        }

        // printing and parsing again gives the same structure
        assert_eq!(Mail::parse(&mail.to_string()).unwrap(), mail);
    }
}
