//! Locator surface syntax: `HASH[@LANG[@OVERLAY_HASH]]`.

use std::fmt;

use bb_error::PoolError;

use crate::{FunctionHash, LangTag, OverlayHash};

/// A parsed locator referring to a function, a function in a language, or
/// one specific overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub hash: FunctionHash,
    pub lang: Option<LangTag>,
    pub overlay: Option<OverlayHash>,
}

impl Locator {
    /// Parse the locator surface syntax.
    ///
    /// The language tag is validated before the function hash, so
    /// `…@en` reports the bad tag even when the hash is also malformed.
    pub fn parse(input: &str) -> Result<Self, PoolError> {
        if input.is_empty() {
            return Err(PoolError::locator(input, "empty locator"));
        }

        let parts: Vec<&str> = input.split('@').collect();
        if parts.len() > 3 {
            return Err(PoolError::locator(
                input,
                format!("expected HASH[@LANG[@OVERLAY]], found {} segments", parts.len()),
            ));
        }

        let lang = match parts.get(1) {
            Some(tag) => Some(LangTag::parse(tag)?),
            None => None,
        };
        let hash = FunctionHash::parse(parts[0])?;
        let overlay = match parts.get(2) {
            Some(overlay) => Some(OverlayHash::parse(overlay)?),
            None => None,
        };

        Ok(Self {
            hash,
            lang,
            overlay,
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash)?;
        if let Some(lang) = &self.lang {
            write!(f, "@{lang}")?;
        }
        if let Some(overlay) = &self.overlay {
            write!(f, "@{overlay}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_error::ErrorKind;

    fn hash64(c: char) -> String {
        c.to_string().repeat(64)
    }

    #[test]
    fn parse_hash_only() {
        let loc = Locator::parse(&hash64('a')).unwrap();
        assert_eq!(loc.hash.as_str(), hash64('a'));
        assert_eq!(loc.lang, None);
        assert_eq!(loc.overlay, None);
    }

    #[test]
    fn parse_hash_and_lang() {
        let input = format!("{}@eng", hash64('a'));
        let loc = Locator::parse(&input).unwrap();
        assert_eq!(loc.lang.as_ref().unwrap().as_str(), "eng");
        assert_eq!(loc.overlay, None);
    }

    #[test]
    fn parse_full_triple() {
        let input = format!("{}@eng@{}", hash64('a'), hash64('d'));
        let loc = Locator::parse(&input).unwrap();
        assert_eq!(loc.lang.as_ref().unwrap().as_str(), "eng");
        assert_eq!(loc.overlay.as_ref().unwrap().as_str(), hash64('d'));
    }

    #[test]
    fn short_lang_reported_before_bad_hash() {
        // Both segments are invalid; the tag wins.
        let err = Locator::parse("abc@en").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLanguageTag);
    }

    #[test]
    fn bad_hash_with_valid_lang() {
        let err = Locator::parse("nothex@eng").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHash);
    }

    #[test]
    fn bad_overlay_hash() {
        let input = format!("{}@eng@short", hash64('a'));
        let err = Locator::parse(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHash);
    }

    #[test]
    fn too_many_segments() {
        let input = format!("{}@eng@{}@extra", hash64('a'), hash64('d'));
        let err = Locator::parse(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocator);
    }

    #[test]
    fn empty_locator() {
        let err = Locator::parse("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocator);
    }

    #[test]
    fn display_round_trip() {
        let input = format!("{}@fra@{}", hash64('0'), hash64('f'));
        let loc = Locator::parse(&input).unwrap();
        assert_eq!(loc.to_string(), input);
    }
}
