/*******************************************************************************
 *     ___                  _   ____  ____
 *    / _ \ _   _  ___  ___| |_|  _ \| __ )
 *   | | | | | | |/ _ \/ __| __| | | |  _ \
 *   | |_| | |_| |  __/\__ \ |_| |_| | |_) |
 *    \__\_\\__,_|\___||___/\__|____/|____/
 *
 *  Copyright (c) 2014-2019 Appsicle
 *  Copyright (c) 2019-2025 QuestDB
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *  http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 ******************************************************************************/

use crate::error::{self, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Table,
    Column,
}

impl NameKind {
    fn label(self) -> &'static str {
        match self {
            NameKind::Table => "Table",
            NameKind::Column => "Column",
        }
    }

    fn refuses(self, c: char) -> bool {
        match c {
            '.' | '?' | ',' | '\'' | '"' | '\\' | '/' | ':' | '(' | ')' | '+' | '*' | '%'
            | '~' | '\u{feff}' => true,
            '-' => self == NameKind::Column,
            c => c.is_ascii_control(),
        }
    }
}

fn validate(kind: NameKind, name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(error::fmt!(
            InvalidName,
            "{} names must have a non-zero length.",
            kind.label()
        ));
    }
    let Some((pos, c)) = name.char_indices().find(|&(_, c)| kind.refuses(c)) else {
        return Ok(());
    };
    let culprit = match c {
        '.' if kind == NameKind::Table => {
            return Err(error::fmt!(
                InvalidName,
                "Bad string {name:?}: Found invalid dot `.` at position {pos}."
            ));
        }
        '\u{feff}' => "a UTF-8 BOM character".to_owned(),
        c => format!("a {c:?} character"),
    };
    Err(error::fmt!(
        InvalidName,
        "Bad string {name:?}: {} names can't contain {culprit}, \
        which was found at byte position {pos}.",
        kind.label()
    ))
}

/// A validated table name.
///
/// Names are non-empty and free of `.`, ASCII control characters, the
/// UTF-8 BOM and any of `?,'"\/:()+*%~`. Passing a `TableName` to a
/// [`Buffer`](crate::ingress::Buffer) method skips re-validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableName<'a>(&'a str);

impl<'a> TableName<'a> {
    pub fn new(name: &'a str) -> crate::Result<Self> {
        validate(NameKind::Table, name)?;
        Ok(Self(name))
    }

    /// Skip validation. The server rejects what the client let through.
    pub fn new_unchecked(name: &'a str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

/// A validated column name: the table name rules, plus no `-`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnName<'a>(&'a str);

impl<'a> ColumnName<'a> {
    pub fn new(name: &'a str) -> crate::Result<Self> {
        validate(NameKind::Column, name)?;
        Ok(Self(name))
    }

    pub fn new_unchecked(name: &'a str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

impl<'a> TryFrom<&'a str> for TableName<'a> {
    type Error = Error;

    fn try_from(name: &'a str) -> crate::Result<Self> {
        Self::new(name)
    }
}

impl<'a> TryFrom<&'a str> for ColumnName<'a> {
    type Error = Error;

    fn try_from(name: &'a str) -> crate::Result<Self> {
        Self::new(name)
    }
}

impl AsRef<str> for TableName<'_> {
    fn as_ref(&self) -> &str {
        self.0
    }
}

impl AsRef<str> for ColumnName<'_> {
    fn as_ref(&self) -> &str {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn column_dot_wording() {
        let err = ColumnName::new("sym.bol").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidName);
        assert_eq!(
            err.msg(),
            "Bad string \"sym.bol\": Column names can't contain a '.' character, \
            which was found at byte position 3."
        );
        let err = ColumnName::new("...bad name..").unwrap_err();
        assert!(err.msg().contains("Column names"), "{}", err.msg());
        assert!(err.msg().ends_with("byte position 0."), "{}", err.msg());
    }

    #[test]
    fn table_dot_wording() {
        assert_eq!(
            TableName::new("x..y").unwrap_err().msg(),
            "Bad string \"x..y\": Found invalid dot `.` at position 1."
        );
    }

    #[test]
    fn byte_positions() {
        // Positions count bytes, not chars.
        let err = TableName::new("é/x").unwrap_err();
        assert!(err.msg().ends_with("'/' character, which was found at byte position 2."));
    }
}
