use lingua::LanguageDetectorBuilder;

/// Languages the pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Italian,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Italian => "it",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Language::English),
            "it" => Some(Language::Italian),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Italian => "Italian",
        }
    }
}

/// Identifies the language of a transcript. `None` when the text gives no
/// reliable signal (empty, digits only, and so on).
pub trait LanguageDetector: Send + Sync + 'static {
    fn detect(&self, text: &str) -> Option<Language>;
}

/// Statistical detection restricted to the pipeline's languages.
pub struct LinguaDetector {
    inner: lingua::LanguageDetector,
}

impl LinguaDetector {
    pub fn new() -> Self {
        let inner = LanguageDetectorBuilder::from_languages(&[
            lingua::Language::English,
            lingua::Language::Italian,
        ])
        .build();
        Self { inner }
    }
}

impl Default for LinguaDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for LinguaDetector {
    fn detect(&self, text: &str) -> Option<Language> {
        match self.inner.detect_language_of(text)? {
            lingua::Language::Italian => Some(Language::Italian),
            lingua::Language::English => Some(Language::English),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english() {
        let text = "Good morning everyone, this is the weekly meeting and we are going to discuss the budget.";
        assert_eq!(LinguaDetector::new().detect(text), Some(Language::English));
    }

    #[test]
    fn test_detects_italian() {
        let text = "Buongiorno a tutti, questa è la riunione settimanale e oggi parliamo del budget dell'azienda.";
        assert_eq!(LinguaDetector::new().detect(text), Some(Language::Italian));
    }

    #[test]
    fn test_detects_italian_without_common_function_words() {
        let text = "Riunione trimestrale: bilancio approvato, fatturato cresciuto, assunzioni previste.";
        assert_eq!(LinguaDetector::new().detect(text), Some(Language::Italian));
    }

    #[test]
    fn test_no_signal_is_undetermined() {
        let detector = LinguaDetector::new();
        assert_eq!(detector.detect(""), None);
        assert_eq!(detector.detect("12345 ..."), None);
    }

    #[test]
    fn test_codes() {
        assert_eq!(Language::Italian.code(), "it");
        assert_eq!(Language::English.code(), "en");
        assert_eq!(Language::Italian.name(), "Italian");
        assert_eq!(Language::from_code("en"), Some(Language::English));
        assert_eq!(Language::from_code("fr"), None);
    }
}
