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

use crate::error;
use std::borrow::Cow;

/// A string value in one of the layouts host-language string objects use.
///
/// `Ucs1`, `Ucs2` and `Ucs4` carry fixed-width code units (Latin-1,
/// UCS-2, UCS-4 respectively). They are transcoded to UTF-8 when written,
/// and code units that are not Unicode scalar values are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text<'a> {
    Utf8(&'a str),
    Ucs1(&'a [u8]),
    Ucs2(&'a [u16]),
    Ucs4(&'a [u32]),
}

impl<'a> Text<'a> {
    /// Borrow the UTF-8 form, transcoding if needed.
    pub fn to_str(&self) -> crate::Result<Cow<'a, str>> {
        match *self {
            Text::Utf8(s) => Ok(Cow::Borrowed(s)),
            Text::Ucs1(units) => {
                // Every Latin-1 unit maps onto the code point of the same value.
                Ok(Cow::Owned(units.iter().map(|&u| u as char).collect()))
            }
            Text::Ucs2(units) => encode_units(units, 3),
            Text::Ucs4(units) => encode_units(units, 4),
        }
    }

    /// Number of code units.
    pub fn len(&self) -> usize {
        match self {
            Text::Utf8(s) => s.len(),
            Text::Ucs1(u) => u.len(),
            Text::Ucs2(u) => u.len(),
            Text::Ucs4(u) => u.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode_units<'a, T>(units: &[T], utf8_mult: usize) -> crate::Result<Cow<'a, str>>
where
    T: Copy + Into<u32>,
{
    let mut out = String::with_capacity(units.len() * utf8_mult);
    for (index, &unit) in units.iter().enumerate() {
        let code: u32 = unit.into();
        match char::from_u32(code) {
            Some(c) => out.push(c),
            None => {
                return Err(error::fmt!(
                    InvalidUtf8,
                    "Invalid codepoint 0x{:x} in string at index {}: \
                    surrogates and values above 0x10ffff are not valid Unicode.",
                    code,
                    index
                ))
            }
        }
    }
    Ok(Cow::Owned(out))
}

impl<'a> From<&'a str> for Text<'a> {
    fn from(s: &'a str) -> Self {
        Text::Utf8(s)
    }
}

impl<'a> From<&'a String> for Text<'a> {
    fn from(s: &'a String) -> Self {
        Text::Utf8(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn ucs1_latin1() {
        let units = [b'c', b'a', b'f', 0xe9];
        assert_eq!(Text::Ucs1(&units).to_str().unwrap(), "caf\u{e9}");
    }

    #[test]
    fn ucs2_and_ucs4() {
        let ucs2: Vec<u16> = "h\u{e9}llo \u{4e16}".encode_utf16().collect();
        assert_eq!(Text::Ucs2(&ucs2).to_str().unwrap(), "h\u{e9}llo \u{4e16}");
        let ucs4: Vec<u32> = "\u{1f600}x".chars().map(|c| c as u32).collect();
        assert_eq!(Text::Ucs4(&ucs4).to_str().unwrap(), "\u{1f600}x");
    }

    #[test]
    fn lone_surrogate() {
        let units = [b'a' as u16, 0xd800, b'b' as u16];
        let err = Text::Ucs2(&units).to_str().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidUtf8);
        assert!(err.msg().contains("codepoint 0xd800 in string"), "{}", err.msg());
        assert!(err.msg().contains("index 1"));
    }

    #[test]
    fn above_max_codepoint() {
        let err = Text::Ucs4(&[0x110000]).to_str().unwrap_err();
        assert!(err.msg().contains("codepoint 0x110000"));
    }
}
