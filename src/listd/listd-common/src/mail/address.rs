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

/// A mailbox found in an address header: `Jane Doe <jane@doe.com>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Address {
    /// display name, if any.
    pub name: Option<String>,
    /// `local@domain` part.
    pub email: String,
}

impl Address {
    /// Local part of the address.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.email
            .rsplit_once('@')
            .map_or(self.email.as_str(), |(local, _)| local)
    }

    /// Domain of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.email.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}

/// Parse one mailbox. Returns `None` when no `local@domain` is found.
#[must_use]
pub fn parse_address(input: &str) -> Option<Address> {
    let input = input.trim();

    if let (Some(open), Some(close)) = (input.rfind('<'), input.rfind('>')) {
        if open < close {
            let email = input[open + 1..close].trim();
            let name = input[..open].trim().trim_matches('"').trim();
            return email.contains('@').then(|| Address {
                name: (!name.is_empty()).then(|| name.to_string()),
                email: email.to_string(),
            });
        }
    }

    // `addr (comment)` form
    let (email, comment) = match input.split_once('(') {
        Some((email, comment)) => (email.trim(), Some(comment.trim_end_matches(')').trim())),
        None => (input, None),
    };

    (email.contains('@') && !email.contains(char::is_whitespace)).then(|| Address {
        name: comment.filter(|c| !c.is_empty()).map(str::to_string),
        email: email.to_string(),
    })
}

/// Parse a comma separated list of mailboxes, ignoring invalid entries.
#[must_use]
pub fn parse_address_list(input: &str) -> Vec<Address> {
    let mut out = vec![];
    let mut current = String::new();
    let (mut quoted, mut angle) = (false, false);

    for c in input.chars() {
        match c {
            '"' => quoted = !quoted,
            '<' if !quoted => angle = true,
            '>' if !quoted => angle = false,
            ',' if !quoted && !angle => {
                out.extend(parse_address(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    out.extend(parse_address(&current));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("jane@doe.com", None, "jane@doe.com")]
    #[case("Jane Doe <jane@doe.com>", Some("Jane Doe"), "jane@doe.com")]
    #[case("\"Doe, Jane\" <jane@doe.com>", Some("Doe, Jane"), "jane@doe.com")]
    #[case("jane@doe.com (Jane Doe)", Some("Jane Doe"), "jane@doe.com")]
    #[case("<jane@doe.com>", None, "jane@doe.com")]
    fn valid(#[case] input: &str, #[case] name: Option<&str>, #[case] email: &str) {
        assert_eq!(
            parse_address(input),
            Some(Address {
                name: name.map(str::to_string),
                email: email.to_string()
            })
        );
    }

    #[test]
    fn invalid() {
        assert_eq!(parse_address("undisclosed-recipients:;"), None);
        assert_eq!(parse_address("Jane <>"), None);
    }

    #[test]
    fn list() {
        let list = parse_address_list("\"Doe, Jane\" <jane@doe.com>, bob@x.org, garbage");
        assert_eq!(
            list.iter().map(|a| a.email.as_str()).collect::<Vec<_>>(),
            vec!["jane@doe.com", "bob@x.org"]
        );
        assert_eq!(list[0].local_part(), "jane");
        assert_eq!(list[1].domain(), "x.org");
    }
}
