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
use super::address::{parse_address, Address};

/// we use Vec instead of a `HashMap` because header ordering is important.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct MailHeaders(pub Vec<(String, String)>);

impl std::fmt::Display for MailHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in self.0.iter().map(|(k, v)| HeaderFoldable(k, v)) {
            write!(f, "{i}")?;
        }
        Ok(())
    }
}

/// Body of a message (or of one MIME part).
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum Body {
    /// Single part content, lines separated by `\n`.
    Text(String),
    /// `multipart/*` content.
    Multipart {
        /// delimiter of the parts, without the leading `--`.
        boundary: String,
        /// text before the first delimiter.
        preamble: String,
        /// the sub parts, in order.
        parts: Vec<Mail>,
        /// text after the closing delimiter.
        epilogue: String,
    },
    /// `message/rfc822` content.
    Message(Box<Mail>),
    /// Header section only.
    Empty,
}

impl Default for Body {
    fn default() -> Self {
        Self::Empty
    }
}

impl std::fmt::Display for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(content) => f.write_str(content),
            Self::Multipart {
                boundary,
                preamble,
                parts,
                epilogue,
            } => {
                if !preamble.is_empty() {
                    f.write_str(preamble)?;
                    if !preamble.ends_with('\n') {
                        f.write_str("\n")?;
                    }
                }
                for part in parts {
                    writeln!(f, "--{boundary}")?;
                    let part = part.to_string();
                    f.write_str(&part)?;
                    if !part.ends_with('\n') {
                        f.write_str("\n")?;
                    }
                }
                writeln!(f, "--{boundary}--")?;
                f.write_str(epilogue)
            }
            Self::Message(inner) => write!(f, "{inner}"),
            Self::Empty => Ok(()),
        }
    }
}

/// A message: an ordered header section followed by a (possibly nested) body.
#[derive(Clone, Default, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Mail {
    /// Message headers
    pub headers: MailHeaders,
    /// Message content
    pub body: Body,
}

#[derive(Debug)]
struct HeaderFoldable<'a>(&'a str, &'a str);

impl<'a> std::fmt::Display for HeaderFoldable<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)?;
        f.write_str(": ")?;

        let mut byte_writable = self.1;
        if byte_writable.is_empty() {
            return f.write_str("\n");
        }

        let mut prev = self.0.len() + 2;

        while !byte_writable.is_empty() {
            let (left, right) = if byte_writable.len() + prev > 78 {
                byte_writable
                    .get(..78usize.saturating_sub(prev))
                    .and_then(|head| head.rfind(char::is_whitespace))
                    .filter(|idx| *idx != 0)
                    .map(|idx| byte_writable.split_at(idx))
            } else {
                None
            }
            .unwrap_or((byte_writable, ""));

            f.write_str(left)?;
            f.write_str("\n")?;

            byte_writable = right.trim_start();
            if !byte_writable.is_empty() {
                std::fmt::Write::write_char(f, '\t')?;
                prev = 1;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Mail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.headers)?;
        f.write_str("\n")?;
        write!(f, "{}", self.body)
    }
}

/// Split a structured header value like `Content-Type` into its main value
/// (lower cased) and its parameters (keys lower cased, quotes removed).
#[must_use]
pub fn split_parameters(value: &str) -> (String, Vec<(String, String)>) {
    let mut params = vec![];
    let mut iter = split_outside_quotes(value, ';').into_iter();
    let main = iter.next().unwrap_or_default().trim().to_lowercase();

    for param in iter {
        if let Some((key, value)) = param.split_once('=') {
            params.push((
                key.trim().to_lowercase(),
                value.trim().trim_matches('"').to_string(),
            ));
        }
    }
    (main, params)
}

fn split_outside_quotes(value: &str, separator: char) -> Vec<String> {
    let mut out = vec![];
    let mut current = String::new();
    let mut quoted = false;
    for c in value.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == separator && !quoted => out.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    out.push(current);
    out
}

impl Mail {
    /// Build a single part text message.
    #[must_use]
    pub fn text(headers: impl IntoIterator<Item = (String, String)>, body: &str) -> Self {
        let mut body = body.to_string();
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        Self {
            headers: MailHeaders(headers.into_iter().collect()),
            body: Body::Text(body),
        }
    }

    /// Build a `multipart/<subtype>` message with a random boundary.
    #[must_use]
    pub fn multipart(
        subtype: &str,
        headers: impl IntoIterator<Item = (String, String)>,
        parts: Vec<Self>,
    ) -> Self {
        let boundary = format!("==============={:020}==", fastrand::u64(..));
        let mut mail = Self {
            headers: MailHeaders(headers.into_iter().collect()),
            body: Body::Multipart {
                boundary: boundary.clone(),
                preamble: String::new(),
                parts,
                epilogue: String::new(),
            },
        };
        mail.set_header("MIME-Version", "1.0");
        mail.set_header(
            "Content-Type",
            &format!("multipart/{subtype}; boundary=\"{boundary}\""),
        );
        mail
    }

    /// Wrap a message in a `message/rfc822` part.
    #[must_use]
    pub fn rfc822(inner: Self) -> Self {
        Self {
            headers: MailHeaders(vec![(
                "Content-Type".to_string(),
                "message/rfc822".to_string(),
            )]),
            body: Body::Message(Box::new(inner)),
        }
    }

    /// rewrite a header with a new value or push it to the header stack.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some((_, old_value)) = self
            .headers
            .0
            .iter_mut()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
        {
            *old_value = value.to_string();
        } else {
            self.headers.0.push((name.to_string(), value.to_string()));
        }
    }

    /// get the value of an header, return None if it does not exists.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .0
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// get every value of an header, in order.
    #[must_use]
    pub fn get_all_headers(&self, name: &str) -> Vec<&str> {
        self.headers
            .0
            .iter()
            .filter(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Count the number of time a header is present.
    #[must_use]
    pub fn count_header(&self, name: &str) -> usize {
        self.headers
            .0
            .iter()
            .filter(|(header, _)| header.eq_ignore_ascii_case(name))
            .count()
    }

    /// prepend new headers to the email.
    pub fn prepend_headers(&mut self, headers: impl IntoIterator<Item = (String, String)>) {
        self.headers.0.splice(..0, headers);
    }

    /// push new headers to the email.
    pub fn push_headers(&mut self, headers: impl IntoIterator<Item = (String, String)>) {
        self.headers.0.extend(headers);
    }

    /// Remove every occurrence of a header, returning how many were removed.
    pub fn remove_header(&mut self, name: &str) -> usize {
        let before = self.headers.0.len();
        self.headers
            .0
            .retain(|(header, _)| !header.eq_ignore_ascii_case(name));
        before - self.headers.0.len()
    }

    /// The `Content-Type` of the message, `text/plain` if absent.
    #[must_use]
    pub fn content_type(&self) -> (String, Vec<(String, String)>) {
        self.get_header("Content-Type")
            .map_or_else(|| ("text/plain".to_string(), vec![]), split_parameters)
    }

    /// Subject of the message, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_header("Subject")
    }

    /// Message-ID of the message, if any.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.get_header("Message-ID")
    }

    /// The author of the message: first address of `From`, then `Sender`,
    /// then `Reply-To`.
    #[must_use]
    pub fn sender(&self) -> Option<Address> {
        ["From", "Sender", "Reply-To"]
            .into_iter()
            .find_map(|h| self.get_header(h).and_then(parse_address))
    }

    /// The parts of a multipart body, empty for single part messages.
    #[must_use]
    pub fn parts(&self) -> &[Self] {
        match &self.body {
            Body::Multipart { parts, .. } => parts,
            _ => &[],
        }
    }

    /// The textual content of the message, or of its first `text/plain` part.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match &self.body {
            Body::Text(text) if self.content_type().0.starts_with("text/") => Some(text),
            Body::Multipart { parts, .. } => parts.iter().find_map(Self::text_content),
            _ => None,
        }
    }

    /// Size of the serialized message in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.to_string().len()
    }
}
