//! Author/committer/tagger identity line: `<name> <<email>> <ts> <±HHMM>`.

use std::fmt::{self, Display};

use bstr::ByteSlice;

use crate::errors::VcsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub tz_offset: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp: i64, tz_offset: impl Into<String>) -> Self {
        Signature {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz_offset: tz_offset.into(),
        }
    }

    /// Parse a single signature line, e.g. `Ada Lovelace <ada@example.com> 1716400000 +0000`.
    pub fn from_data(data: &[u8]) -> Result<Signature, VcsError> {
        let text = data.to_str().map_err(|e| {
            VcsError::Corrupt(format!("signature line is not valid UTF-8: {e}"))
        })?;
        let open = text
            .find('<')
            .ok_or_else(|| VcsError::Corrupt(format!("signature missing '<': {text}")))?;
        let close = text
            .find('>')
            .ok_or_else(|| VcsError::Corrupt(format!("signature missing '>': {text}")))?;
        if close < open {
            return Err(VcsError::Corrupt(format!("malformed signature: {text}")));
        }
        let name = text[..open].trim().to_string();
        let email = text[open + 1..close].to_string();
        let rest: Vec<&str> = text[close + 1..].trim().split_whitespace().collect();
        if rest.len() != 2 {
            return Err(VcsError::Corrupt(format!(
                "signature missing timestamp/timezone: {text}"
            )));
        }
        let timestamp: i64 = rest[0]
            .parse()
            .map_err(|_| VcsError::Corrupt(format!("invalid signature timestamp: {}", rest[0])))?;
        Ok(Signature {
            name,
            email,
            timestamp,
            tz_offset: rest[1].to_string(),
        })
    }

    pub fn to_data(&self) -> Result<Vec<u8>, VcsError> {
        Ok(self.to_string().into_bytes())
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.tz_offset
        )
    }
}
