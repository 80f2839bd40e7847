//! Title canonicalization for comparison.
//!
//! Keys produced here are only ever compared with each other. They are never
//! shown to the user and never sent to the catalog as a search string: the
//! catalog gets the title exactly as the user wrote it.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Any bracketed qualifier: "(Remastered)", "[Live]", "{Demo}", "<Edit>"
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]|\{[^}]*\}|<[^>]*>").unwrap());

/// Featured artists without brackets: "Song feat. Artist", "Song ft. Someone"
static FEAT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(?:feat\.?|ft\.?|featuring)\s+.*$").unwrap());

/// Dash-separated remaster tags: "Song - Remastered 2011", "Song - 2009 Remaster"
static REMASTER_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+[-–—]\s+(?:\d{4}\s+)?(?:digital\s+)?remaster(?:ed)?(?:\s+\d{4})?\s*$").unwrap()
});

/// Upload tags left at the end once brackets are gone: "song official video"
static VIDEO_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+(?:official\s+)?(?:music\s+)?(?:lyrics?\s+)?(?:video|audio|mv|visualizer|lyrics?)(?:\s+(?:hd|hq|4k))?$")
        .unwrap()
});

/// Channel-style upload names: "Ed Sheeran - Shape of You"
static ARTIST_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^()\[\]{}]+?)\s+[-–—]\s+(\S.*)$").unwrap());

static BRACKET_CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[(\[{]([^)\]}]*)[)\]}]").unwrap());

/// Words marking a version or upload qualifier rather than a song name
static QUALIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:feat|ft|featuring|with|from|prod|remaster(?:ed)?|remix|mix|live|edit|version|ver|acoustic|cover|karaoke|instrumental|official|audio|video|lyrics?|mv|hd|hq|4k|visualizer|explicit|clean|radio|demo|mono|stereo|slowed|sped|reverb|intro|outro|interlude|skit|bonus|ost|soundtrack|theme|\d{4})\b",
    )
    .unwrap()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical comparison key for a title or artist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Normalize a title for comparison.
///
/// Folds case and diacritics, strips bracketed qualifiers, trailing
/// "feat." credits and upload tags ("Official Video"), drops punctuation and
/// collapses whitespace. A title made only of a bracketed part, e.g.
/// "(Intro)", keeps its bracket content so it does not collapse to an empty
/// key.
pub fn normalize(text: &str) -> NormalizedKey {
    let folded = fold(text);

    let stripped = BRACKETED.replace_all(&folded, " ");
    let stripped = FEAT_SUFFIX.replace(&stripped, "");
    let stripped = REMASTER_SUFFIX.replace(&stripped, "");
    let mut key = finish(&stripped);

    if key.is_empty() {
        key = finish(&folded);
    }
    while let Some(tag) = VIDEO_SUFFIX.find(&key) {
        key.truncate(tag.start());
    }
    NormalizedKey(key)
}

/// Every comparison form of one title.
///
/// Besides the plain key, an upload title carries aliases: the song part of
/// "Artist - Song", and bracketed alternative names such as a translation in
/// "永遠に光れ (Everlasting Shine)". Brackets and dash parts holding only
/// version qualifiers ("Live at Wembley", "2015 Remaster") are not aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleKeys {
    key: NormalizedKey,
    aliases: Vec<NormalizedKey>,
    credited_artist: Option<NormalizedKey>,
}

impl TitleKeys {
    pub fn parse(title: &str) -> Self {
        let key = normalize(title);
        let mut aliases: Vec<NormalizedKey> = Vec::new();
        let mut credited_artist = None;

        if let Some(caps) = ARTIST_PREFIX.captures(title) {
            let song = normalize(&caps[2]);
            if !song.is_empty() && song != key && !QUALIFIER.is_match(song.as_str()) {
                credited_artist = normalize_opt(Some(&caps[1]));
                aliases.push(song);
            }
        }

        for caps in BRACKET_CONTENT.captures_iter(title) {
            if QUALIFIER.is_match(&caps[1]) {
                continue;
            }
            let alias = normalize(&caps[1]);
            if alias.as_str().chars().count() > 1 && alias != key && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        Self {
            key,
            aliases,
            credited_artist,
        }
    }

    pub fn key(&self) -> &NormalizedKey {
        &self.key
    }

    pub fn aliases(&self) -> &[NormalizedKey] {
        &self.aliases
    }

    /// Artist named by an "Artist - Song" prefix.
    pub fn credited_artist(&self) -> Option<&NormalizedKey> {
        self.credited_artist.as_ref()
    }

    /// The plain key followed by every alias.
    pub fn forms(&self) -> impl Iterator<Item = &NormalizedKey> {
        std::iter::once(&self.key).chain(self.aliases.iter())
    }
}

/// Normalize an optional field (artist, album); blank input yields `None`.
pub fn normalize_opt(text: Option<&str>) -> Option<NormalizedKey> {
    text.map(normalize).filter(|key| !key.is_empty())
}

/// Case and diacritic folding: "Beyoncé" → "beyonce".
fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Drop punctuation, collapse whitespace, trim.
fn finish(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() || c == '-' || c == '/' || c == '_' {
                Some(' ')
            } else {
                None
            }
        })
        .collect();
    WHITESPACE.replace_all(cleaned.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feat_in_brackets_is_stripped() {
        assert_eq!(normalize("Shape of You (feat. X)"), normalize("shape of you"));
    }

    #[test]
    fn test_remastered_qualifier_is_stripped() {
        assert_eq!(
            normalize("shape of you (Remastered)").as_str(),
            "shape of you"
        );
        assert_eq!(normalize("Yesterday - Remastered 2009").as_str(), "yesterday");
        assert_eq!(normalize("Help! [2015 Mix]").as_str(), "help");
    }

    #[test]
    fn test_diacritics_and_case_fold() {
        assert_eq!(normalize("Déjà Vu").as_str(), "deja vu");
        assert_eq!(normalize("BEYONCÉ").as_str(), "beyonce");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        assert_eq!(normalize("  Don't   Stop  Me Now!! ").as_str(), "dont stop me now");
        assert_eq!(normalize("Rock-n-Roll").as_str(), "rock n roll");
    }

    #[test]
    fn test_unbracketed_feat_suffix() {
        assert_eq!(normalize("Stay ft. Justin Bieber").as_str(), "stay");
    }

    #[test]
    fn test_bracket_only_title_keeps_content() {
        assert_eq!(normalize("(Intro)").as_str(), "intro");
    }

    #[test]
    fn test_non_latin_titles_survive() {
        assert_eq!(normalize("永遠に光れ (Everlasting Shine)").as_str(), "永遠に光れ");
    }

    #[test]
    fn test_upload_tags_are_stripped() {
        assert_eq!(normalize("Shape of You Official Music Video").as_str(), "shape of you");
        assert_eq!(normalize("Yellow | Lyrics").as_str(), "yellow");
        assert_eq!(normalize("Hello - Official Audio").as_str(), "hello");
        assert_eq!(normalize("Video").as_str(), "video");
        assert_eq!(normalize("Video Killed the Radio Star").as_str(), "video killed the radio star");
    }

    #[test]
    fn test_artist_prefix_becomes_alias() {
        let keys = TitleKeys::parse("Ed Sheeran - Shape of You (Official Video)");
        assert_eq!(keys.key().as_str(), "ed sheeran shape of you");
        assert_eq!(keys.aliases(), &[normalize("Shape of You")]);
        assert_eq!(keys.credited_artist().map(|a| a.as_str()), Some("ed sheeran"));
    }

    #[test]
    fn test_qualifier_parts_are_not_aliases() {
        let live = TitleKeys::parse("Yesterday - Live at Wembley");
        assert!(live.aliases().is_empty());
        assert_eq!(live.credited_artist(), None);

        let remaster = TitleKeys::parse("Yesterday - Remastered 2009");
        assert_eq!(remaster.key().as_str(), "yesterday");
        assert!(remaster.aliases().is_empty());

        let tagged = TitleKeys::parse("Help! [2015 Mix] (feat. Someone)");
        assert!(tagged.aliases().is_empty());
    }

    #[test]
    fn test_bracketed_translation_is_alias() {
        let keys = TitleKeys::parse("永遠に光れ (Everlasting Shine)");
        assert_eq!(keys.key().as_str(), "永遠に光れ");
        let forms: Vec<&str> = keys.forms().map(|k| k.as_str()).collect();
        assert_eq!(forms, vec!["永遠に光れ", "everlasting shine"]);
    }

    #[test]
    fn test_normalize_opt_blank() {
        assert_eq!(normalize_opt(Some("  ")), None);
        assert_eq!(normalize_opt(None), None);
        assert_eq!(
            normalize_opt(Some("Ed Sheeran")).map(|k| k.as_str().to_string()),
            Some("ed sheeran".to_string())
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Same input, same key
        #[test]
        fn normalize_is_deterministic(input in ".{0,60}") {
            prop_assert_eq!(normalize(&input), normalize(&input));
        }

        /// Keys never carry leading, trailing or doubled whitespace
        #[test]
        fn normalized_whitespace_is_collapsed(input in "[a-zA-Z ()\\[\\]'!.-]{0,60}") {
            let key = normalize(&input);
            let s = key.as_str();
            prop_assert_eq!(s.trim(), s);
            prop_assert!(!s.contains("  "), "Doubled space in: {:?}", s);
        }

        /// Keys are already normalized
        #[test]
        fn normalize_is_idempotent(input in "[a-zA-Z0-9 ]{0,60}") {
            let once = normalize(&input);
            let twice = normalize(once.as_str());
            prop_assert_eq!(once, twice);
        }
    }
}
