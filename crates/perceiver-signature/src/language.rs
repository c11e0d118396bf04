//! Text language heuristic backing `Check::require_text_language`.

use whatlang::{detect, Lang};

/// Returns true when `text` is detected as the language named by `code`.
///
/// `code` may be ISO 639-1 (`en`) or ISO 639-3 (`eng`); comparison is
/// case-insensitive. Empty text never matches.
pub fn text_matches_language(text: &str, code: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let Some(info) = detect(trimmed) else {
        return false;
    };
    let wanted = code.trim().to_ascii_lowercase();
    let lang = info.lang();
    lang.code() == wanted || iso_639_1(lang) == Some(wanted.as_str())
}

fn iso_639_1(lang: Lang) -> Option<&'static str> {
    let code = match lang {
        Lang::Eng => "en",
        Lang::Cmn => "zh",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Rus => "ru",
        Lang::Jpn => "ja",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Kor => "ko",
        Lang::Ara => "ar",
        Lang::Hin => "hi",
        Lang::Ben => "bn",
        Lang::Vie => "vi",
        Lang::Tha => "th",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Tur => "tr",
        Lang::Ukr => "uk",
        Lang::Swe => "sv",
        _ => return None,
    };
    Some(code)
}
