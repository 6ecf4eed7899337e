//! URL-path escaping for catalog identifiers (spec §4.C, §6): slashes must
//! be escaped as `%2F` and spaces as `%20` — a raw `/` in an identifier
//! segment causes the catalog to return 404.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

const IDENTIFIER_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'%');

pub fn escape_identifier(raw: &str) -> String {
    utf8_percent_encode(raw, IDENTIFIER_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_is_escaped_as_percent_2f() {
        assert_eq!(escape_identifier("ncsu.edu/bag1"), "ncsu.edu%2Fbag1");
    }

    #[test]
    fn space_is_escaped() {
        assert_eq!(escape_identifier("my bag"), "my%20bag");
    }
}
